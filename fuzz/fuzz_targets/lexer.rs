#![no_main]

use journal_assist::{amount, classify, lexer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        for line in text.lines() {
            let _ = lexer::tokenize_line(line);
            let _ = lexer::comment_tags(line);
            let _ = amount::commodities_in(line);

            let context = classify(line);
            assert!(line.ends_with(context.query));
        }
        let _ = journal_assist::parse_content(text, None);
    }
});
