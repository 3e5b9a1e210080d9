use crate::names::TagName;

use once_cell::sync::Lazy;
use regex::Regex;

/// Kind of entity being typed at the cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextKind {
    Date,
    Account,
    Payee,
    Commodity,
    Tag,
    TagValue { tag: TagName },
    Keyword,
    None,
}

/// Result of classifying the text before the cursor. `query` is always a
/// suffix of that text, starting at byte offset `query_start`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionContext<'t> {
    pub kind: ContextKind,
    pub query: &'t str,
    pub query_start: usize,
}

impl<'t> CompletionContext<'t> {
    fn at(kind: ContextKind, text: &'t str, query_start: usize) -> CompletionContext<'t> {
        CompletionContext {
            kind,
            query: &text[query_start..],
            query_start,
        }
    }

    fn none(text: &'t str) -> CompletionContext<'t> {
        CompletionContext::at(ContextKind::None, text, text.len())
    }
}

static TAG_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)([\p{L}\p{N}_-]+):([^,]*)$").unwrap());

static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{1,4}|\d{4}[-/.]\d{0,2}(?:[-/.]\d{0,2})?)$").unwrap());

static TXN_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}[-/.]\d{1,2}[-/.]\d{1,2}(?:=\S*)?\s+(?:[*!]\s*)?(?:\([^)]*\)\s*)?").unwrap()
});

static ACCOUNT_ARG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:apply\s+)?account|alias\s+[^=]*=|alias)\s+").unwrap());

static COMMODITY_ARG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:commodity|D|P\s+\d\S*)\s+").unwrap());

/// Maximum length of a line prefix still read as a date being typed.
const DATE_PREFIX_MAX: usize = 12;

const KEYWORD_MAX: usize = 16;

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ':' | '-' | '_')
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_')
}

fn is_commodity_char(c: char) -> bool {
    !(c.is_ascii_digit()
        || c.is_whitespace()
        || matches!(
            c,
            '-' | '+' | '.' | ',' | '"' | ';' | '@' | '=' | '*' | '/' | '(' | ')' | '{' | '}'
        ))
}

/// Byte offset where the trailing run of `pred` characters starts.
fn trailing_run(text: &str, pred: impl Fn(char) -> bool) -> usize {
    text.char_indices()
        .rev()
        .take_while(|&(_, c)| pred(c))
        .last()
        .map_or(text.len(), |(idx, _)| idx)
}

fn is_indented(text: &str) -> bool {
    text.starts_with([' ', '\t'])
}

/// Byte offset just after the comment marker, if the cursor is inside a comment.
fn comment_start(text: &str) -> Option<usize> {
    if text.starts_with([';', '#', '*', '%']) {
        return Some(1);
    }
    let body = text.trim_start();
    if is_indented(text) && body.starts_with('#') {
        return Some(text.len() - body.len() + 1);
    }
    text.find(';').map(|idx| idx + 1)
}

fn comment_rule(text: &str) -> Option<CompletionContext<'_>> {
    let start = comment_start(text)?;
    let segment_start = text[start..].rfind(',').map_or(start, |idx| start + idx + 1);
    let segment = &text[segment_start..];

    if let Some(captures) = TAG_VALUE.captures(segment) {
        let (Some(tag), Some(value)) = (captures.get(1), captures.get(2)) else {
            return None;
        };
        let query_start = segment_start + value.end() - value.as_str().trim_start().len();
        let kind = ContextKind::TagValue {
            tag: TagName::from(tag.as_str()),
        };
        return Some(CompletionContext::at(kind, text, query_start));
    }

    let query_start = segment_start + trailing_run(segment, is_tag_char);
    Some(CompletionContext::at(ContextKind::Tag, text, query_start))
}

fn date_rule(text: &str) -> Option<CompletionContext<'_>> {
    (text.len() <= DATE_PREFIX_MAX && DATE.is_match(text))
        .then(|| CompletionContext::at(ContextKind::Date, text, 0))
}

fn payee_rule(text: &str) -> Option<CompletionContext<'_>> {
    let prefix = TXN_PREFIX.find(text)?;
    let context = CompletionContext::at(ContextKind::Payee, text, prefix.end());
    // past the `|`, the note is being typed
    if context.query.contains('|') {
        return Some(CompletionContext::none(text));
    }
    Some(context)
}

fn keyword_rule(text: &str) -> Option<CompletionContext<'_>> {
    let first = text.chars().next()?;
    let short = text.chars().count() <= KEYWORD_MAX && !text.contains(char::is_whitespace);
    (short && !first.is_ascii_digit()).then(|| CompletionContext::at(ContextKind::Keyword, text, 0))
}

fn directive_argument_rule(text: &str) -> Option<CompletionContext<'_>> {
    if let Some(prefix) = ACCOUNT_ARG.find(text) {
        return Some(CompletionContext::at(ContextKind::Account, text, prefix.end()));
    }
    if let Some(rest) = text.strip_prefix("payee") {
        let argument = rest.trim_start();
        if argument.len() < rest.len() {
            let start = text.len() - argument.len();
            return Some(CompletionContext::at(ContextKind::Payee, text, start));
        }
    }
    if let Some(rest) = text.strip_prefix("tag") {
        if rest.starts_with(char::is_whitespace) {
            let query_start = trailing_run(text, is_tag_char);
            return Some(CompletionContext::at(ContextKind::Tag, text, query_start));
        }
    }
    None
}

/// Posting account column: status mark and virtual brackets are not part of the query.
fn account_column(text: &str) -> (usize, &str) {
    let mut body = text.trim_start();
    if let Some(rest) = body.strip_prefix(['*', '!']) {
        body = rest.trim_start();
    }
    if let Some(rest) = body.strip_prefix(['(', '[']) {
        body = rest;
    }
    (text.len() - body.len(), body)
}

fn has_gap(text: &str) -> bool {
    text.contains("  ") || text.contains('\t')
}

fn account_rule(text: &str) -> Option<CompletionContext<'_>> {
    if !is_indented(text) {
        return None;
    }
    let (start, account) = account_column(text);
    (!has_gap(account)).then(|| CompletionContext::at(ContextKind::Account, text, start))
}

fn commodity_rule(text: &str) -> Option<CompletionContext<'_>> {
    let commodity = || {
        CompletionContext::at(ContextKind::Commodity, text, trailing_run(text, is_commodity_char))
    };

    if COMMODITY_ARG.is_match(text) {
        return Some(commodity());
    }
    if !is_indented(text) {
        return None;
    }

    let (start, account) = account_column(text);
    let gap = account.find("  ").into_iter().chain(account.find('\t')).min()?;
    let amount = text[start + gap..].trim();
    (!amount.is_empty()).then(commodity)
}

fn indented_rule(text: &str) -> Option<CompletionContext<'_>> {
    let start = trailing_run(text, is_name_char);
    is_indented(text).then(|| CompletionContext::at(ContextKind::Account, text, start))
}

fn fallback_rule(text: &str) -> Option<CompletionContext<'_>> {
    if text.contains(char::is_whitespace) {
        return Some(CompletionContext::none(text));
    }
    Some(CompletionContext::at(ContextKind::Keyword, text, 0))
}

type ContextRule = fn(&str) -> Option<CompletionContext<'_>>;

/// Evaluated top-down, first match wins. The date rule runs before the
/// indentation rules so a date typed digit by digit is never read as anything else.
static RULES: &[(&str, ContextRule)] = &[
    ("comment", comment_rule),
    ("date", date_rule),
    ("payee", payee_rule),
    ("keyword", keyword_rule),
    ("directive argument", directive_argument_rule),
    ("account", account_rule),
    ("commodity", commodity_rule),
    ("indented", indented_rule),
    ("fallback", fallback_rule),
];

/// Decide what is being typed from the text of the current line up to the cursor.
pub fn classify(text_before_cursor: &str) -> CompletionContext<'_> {
    let text = text_before_cursor.strip_suffix('\r').unwrap_or(text_before_cursor);

    for (name, rule) in RULES {
        if let Some(context) = rule(text) {
            log::trace!("'{}' classified by {} rule as {:?}", text, name, context.kind);
            return context;
        }
    }

    CompletionContext::none(text)
}

#[cfg(test)]
mod tests {
    use super::{classify, ContextKind};

    fn kind_and_query(text: &str) -> (ContextKind, &str) {
        let context = classify(text);
        assert_eq!(&text[context.query_start..], context.query);
        (context.kind, context.query)
    }

    #[test]
    fn payee_after_date() {
        assert_eq!(kind_and_query("2024-01-15 Gro"), (ContextKind::Payee, "Gro"));
        assert_eq!(kind_and_query("2024/1/5 * (42) Whole Fo"), (ContextKind::Payee, "Whole Fo"));
        assert_eq!(kind_and_query("2024-01-15=2024-01-20 ! "), (ContextKind::Payee, ""));
        assert_eq!(kind_and_query("2024-01-15 Grocer | we").0, ContextKind::None);
    }

    #[test]
    fn accounts_on_indented_lines() {
        assert_eq!(kind_and_query("  Assets:Ca"), (ContextKind::Account, "Assets:Ca"));
        assert_eq!(kind_and_query("    * (Budget:Fo"), (ContextKind::Account, "Budget:Fo"));
        assert_eq!(
            kind_and_query("\tExpenses:Eating Ou"),
            (ContextKind::Account, "Expenses:Eating Ou")
        );
        assert_eq!(kind_and_query("    "), (ContextKind::Account, ""));
        assert_eq!(kind_and_query("  Assets:Cash   "), (ContextKind::Account, ""));
    }

    #[test]
    fn commodity_after_amount() {
        assert_eq!(kind_and_query("  Assets:Cash   10"), (ContextKind::Commodity, ""));
        assert_eq!(kind_and_query("  Assets:Cash   10 US"), (ContextKind::Commodity, "US"));
        assert_eq!(kind_and_query("  Assets:Cash\t-€"), (ContextKind::Commodity, "€"));
        assert_eq!(kind_and_query("commodity EU"), (ContextKind::Commodity, "EU"));
        assert_eq!(kind_and_query("P 2024-03-01 EU"), (ContextKind::Commodity, "EU"));
    }

    #[test]
    fn tags_in_comments() {
        assert_eq!(
            kind_and_query("; project:w"),
            (
                ContextKind::TagValue {
                    tag: "project".into()
                },
                "w"
            )
        );
        assert_eq!(
            kind_and_query("    Expenses:Food  5 USD ; trip:home, cli"),
            (ContextKind::Tag, "cli")
        );
        assert_eq!(
            kind_and_query("2024-01-15 Market  ; client: Acme C"),
            (
                ContextKind::TagValue {
                    tag: "client".into()
                },
                "Acme C"
            )
        );
        assert_eq!(kind_and_query("    # проект:д").1, "д");
    }

    #[test]
    fn dates_typed_progressively() {
        for text in ["2", "20", "202", "2024", "2024-", "2024-0", "2024-01-", "2024/01/1"] {
            assert_eq!(kind_and_query(text), (ContextKind::Date, text), "{}", text);
        }
    }

    #[test]
    fn keywords_and_directive_arguments() {
        assert_eq!(kind_and_query("acc"), (ContextKind::Keyword, "acc"));
        assert_eq!(kind_and_query(""), (ContextKind::Keyword, ""));
        assert_eq!(kind_and_query("account Assets:Ba"), (ContextKind::Account, "Assets:Ba"));
        assert_eq!(kind_and_query("alias chk = Assets:Ch"), (ContextKind::Account, "Assets:Ch"));
        assert_eq!(kind_and_query("payee Whole F"), (ContextKind::Payee, "Whole F"));
        assert_eq!(kind_and_query("tag tr"), (ContextKind::Tag, "tr"));
        assert_eq!(kind_and_query("include other.journal").0, ContextKind::None);
    }
}
