use crate::knowledge::{KnowledgeBase, KnowledgeBuilder};

use std::path::Path;

/// Extend the workspace knowledge with the unsaved text of the active
/// document. `base` is never modified: the result shares its storage until a
/// part actually changes. The line being edited is left out so a
/// half-typed entity does not suggest itself.
pub fn overlay_document(
    base: &KnowledgeBase,
    text: &str,
    path: Option<&Path>,
    excluded_line: Option<usize>,
) -> KnowledgeBase {
    let mut builder = KnowledgeBuilder::overlay(base);
    builder.feed(text, excluded_line);

    if let Some(path) = path {
        log::trace!("overlaid unsaved content of {}", path.display());
    }

    builder.finish()
}
