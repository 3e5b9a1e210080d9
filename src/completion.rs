use crate::{
    cache::{CacheEntry, CacheStore, MemoryStore, WorkspaceCache},
    config::EngineConfig,
    context::{classify, CompletionContext, ContextKind},
    fuzzy::{fuzzy_match, FuzzyMatch},
    knowledge::{KnowledgeBase, KnowledgeBuilder},
    lexer::DirectiveKind,
    merge::overlay_document,
    usage::UsageSource,
    workspace::{resolve_project_root, DocumentId, ProjectRoot},
};

use chrono::{Duration, Local, NaiveDate};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Indentation used for postings in transaction skeletons.
const POSTING_INDENT: &str = "    ";

#[derive(Clone, Debug)]
pub struct CompletionRequest<'r> {
    pub document: DocumentId,
    /// Full current text of the document, saved or not
    pub text: &'r str,
    /// Zero-based cursor line
    pub line: usize,
    /// Zero-based cursor column, in characters
    pub column: usize,
    /// Line being typed, left out of the document overlay
    pub editing_line: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionKind {
    Account,
    Payee,
    Tag,
    TagValue,
    Commodity,
    Date,
    Keyword,
}

/// Character range on one line replaced by an accepted completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextRange {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
    pub documentation: Option<String>,
    pub range: TextRange,
    pub insert_text: String,
    pub is_snippet: bool,
    pub score: u32,
}

impl CompletionItem {
    fn new(label: &str, kind: CompletionKind, range: TextRange, score: u32) -> CompletionItem {
        CompletionItem {
            label: label.to_string(),
            kind,
            detail: None,
            documentation: None,
            range,
            insert_text: label.to_string(),
            is_snippet: false,
            score,
        }
    }
}

fn usage_detail(declared: bool, used: u32) -> Option<String> {
    let used_text = match used {
        0 => None,
        1 => Some("used 1 time".to_string()),
        n => Some(format!("used {} times", n)),
    };
    match (declared, used_text) {
        (true, Some(used)) => Some(format!("declared, {}", used)),
        (true, None) => Some("declared".to_string()),
        (false, used) => used,
    }
}

/// Cursor position clamped to the line, as (byte offset, character column).
fn cursor_in_line(line: &str, column: usize) -> (usize, usize) {
    match line.char_indices().nth(column) {
        Some((idx, _)) => (idx, column),
        None => (line.len(), line.chars().count()),
    }
}

/// Answers completion requests against cached workspace knowledge plus the
/// live text of the requesting document.
pub struct CompletionEngine<S: CacheStore = MemoryStore> {
    cache: WorkspaceCache<S>,
    active_root: Mutex<Option<PathBuf>>,
}

impl CompletionEngine<MemoryStore> {
    pub fn new(config: EngineConfig) -> Self {
        CompletionEngine::with_cache(WorkspaceCache::in_memory(config))
    }
}

impl<S: CacheStore> CompletionEngine<S> {
    pub fn with_cache(cache: WorkspaceCache<S>) -> Self {
        CompletionEngine {
            cache,
            active_root: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &WorkspaceCache<S> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        self.cache.config()
    }

    /// Cached workspace of `root`, if it has one on disk. Switching to another
    /// root rescans it once so new files and config edits are picked up.
    fn workspace(&self, root: &ProjectRoot) -> Option<Arc<CacheEntry>> {
        let path = root.path()?;

        let switched = {
            let mut active = self
                .active_root
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let switched = active.as_deref() != Some(path);
            if switched {
                *active = Some(path.to_path_buf());
            }
            switched
        };

        if switched && self.cache.entry(path).is_some() {
            log::debug!("active root changed to {}", path.display());
            return Some(self.cache.rescan(path));
        }
        Some(self.cache.current(path))
    }

    pub fn complete(&self, request: &CompletionRequest<'_>) -> Vec<CompletionItem> {
        self.complete_on(request, Local::now().date_naive())
    }

    /// Same as [`complete`](Self::complete) with an explicit current date.
    pub fn complete_on(
        &self,
        request: &CompletionRequest<'_>,
        today: NaiveDate,
    ) -> Vec<CompletionItem> {
        let root = resolve_project_root(&request.document, self.config());
        let workspace = self.workspace(&root);

        let (knowledge, config) = match &workspace {
            Some(entry) => {
                let knowledge = overlay_document(
                    &entry.knowledge,
                    request.text,
                    request.document.path(),
                    request.editing_line,
                );
                (knowledge, entry.config.as_ref())
            }
            None => {
                // no workspace to share with, the text is all there is
                let mut builder = KnowledgeBuilder::new();
                builder.feed(request.text, request.editing_line);
                (builder.finish(), self.config())
            }
        };

        let line = request.text.lines().nth(request.line).unwrap_or("");
        let (cursor, column) = cursor_in_line(line, request.column);
        let context = classify(&line[..cursor]);
        let generator = Generator {
            config,
            kb: &knowledge,
            context: &context,
            range: TextRange {
                line: request.line,
                start: column - context.query.chars().count(),
                end: column,
            },
        };

        let items = match &context.kind {
            ContextKind::Account => generator.accounts(),
            ContextKind::Payee => generator.payees(),
            ContextKind::Tag => generator.tags(),
            ContextKind::TagValue { tag } => generator.tag_values(tag.as_str()),
            ContextKind::Commodity => generator.commodities(),
            ContextKind::Date => generator.dates(today),
            ContextKind::Keyword => generator.keywords(),
            ContextKind::None => Vec::new(),
        };

        log::debug!(
            "{} {:?} candidates for '{}' in {}",
            items.len(),
            context.kind,
            context.query,
            root.path()
                .map_or_else(|| "detached document".to_string(), |p: &Path| p.display().to_string())
        );
        items
    }
}

/// Everything the candidate generators of one request rank against.
struct Generator<'g> {
    config: &'g EngineConfig,
    kb: &'g KnowledgeBase,
    context: &'g CompletionContext<'g>,
    range: TextRange,
}

impl<'g> Generator<'g> {
    fn item(&self, label: &str, kind: CompletionKind, score: u32) -> CompletionItem {
        CompletionItem::new(label, kind, self.range, score)
    }

    /// Fuzzy ranking followed by self-suggestion suppression: an exact match
    /// of the query is dropped while it has barely been used.
    fn rank<'c, T: AsRef<str>>(
        &self,
        candidates: &'c [T],
        usage: Option<&dyn UsageSource>,
    ) -> Vec<FuzzyMatch<'c>> {
        let query = self.context.query;
        let threshold = self.config.self_suggestion_threshold;
        let mut matches = fuzzy_match(query, candidates, usage, &self.config.match_options());
        matches.retain(|m| m.candidate != query || m.usage > threshold);
        matches
    }

    fn accounts(&self) -> Vec<CompletionItem> {
        let kb = self.kb;
        let candidates: Vec<&str> = kb.accounts().into_iter().map(|a| a.as_str()).collect();

        self.rank(&candidates, Some(kb.account_usage()))
            .into_iter()
            .map(|m| {
                let mut item = self.item(m.candidate, CompletionKind::Account, m.score);
                item.detail = usage_detail(kb.declared_accounts().contains(m.candidate), m.usage);
                let aliases: Vec<&str> = kb
                    .aliases()
                    .iter()
                    .filter(|(_, to)| to.as_str() == m.candidate)
                    .map(|(from, _)| from.as_str())
                    .collect();
                if !aliases.is_empty() {
                    item.documentation = Some(format!("Aliases: {}", aliases.join(", ")));
                }
                item
            })
            .collect()
    }

    fn payees(&self) -> Vec<CompletionItem> {
        let kb = self.kb;
        let candidates: Vec<&str> = kb.payees().into_iter().map(|p| p.as_str()).collect();

        self.rank(&candidates, Some(kb.payee_usage()))
            .into_iter()
            .map(|m| {
                let mut item = self.item(m.candidate, CompletionKind::Payee, m.score);
                item.detail = usage_detail(kb.declared_payees().contains(m.candidate), m.usage);
                if let Some(template) = kb.templates_for(m.candidate).and_then(|t| t.best()) {
                    item.insert_text = template.snippet(m.candidate, POSTING_INDENT);
                    item.is_snippet = true;
                    item.documentation = Some(template.preview(POSTING_INDENT));
                }
                item
            })
            .collect()
    }

    fn tags(&self) -> Vec<CompletionItem> {
        let kb = self.kb;
        let candidates: Vec<&str> = kb.tags().into_iter().map(|t| t.as_str()).collect();

        self.rank(&candidates, Some(kb.tag_usage()))
            .into_iter()
            .map(|m| {
                let mut item = self.item(m.candidate, CompletionKind::Tag, m.score);
                item.detail = usage_detail(kb.declared_tags().contains(m.candidate), m.usage);
                item
            })
            .collect()
    }

    fn tag_values(&self, tag: &str) -> Vec<CompletionItem> {
        let Some(values) = self.kb.tag_values(tag) else {
            return Vec::new();
        };
        let candidates: Vec<&str> = values.keys().map(String::as_str).collect();

        self.rank(&candidates, Some(values))
            .into_iter()
            .map(|m| {
                let mut item = self.item(m.candidate, CompletionKind::TagValue, m.score);
                item.detail = usage_detail(false, m.usage);
                item
            })
            .collect()
    }

    fn commodities(&self) -> Vec<CompletionItem> {
        let kb = self.kb;
        let candidates: Vec<&str> = kb.commodities().into_iter().map(|c| c.as_str()).collect();
        let default = kb.default_commodity().map(|c| c.as_str());

        self.rank(&candidates, Some(kb.commodity_usage()))
            .into_iter()
            .map(|m| {
                let mut item = self.item(m.candidate, CompletionKind::Commodity, m.score);
                let declared = kb.declared_commodities().contains(m.candidate);
                item.detail = usage_detail(declared, m.usage);
                if default == Some(m.candidate) {
                    item.documentation = Some("Default commodity".to_string());
                }
                item
            })
            .collect()
    }

    fn keywords(&self) -> Vec<CompletionItem> {
        let candidates: Vec<&str> = DirectiveKind::ALL.iter().map(|kind| kind.keyword()).collect();
        let options = self.config.match_options();

        fuzzy_match(self.context.query, &candidates, None, &options)
            .into_iter()
            .filter_map(|m| {
                let kind = DirectiveKind::ALL
                    .iter()
                    .find(|kind| kind.keyword() == m.candidate)?;
                let mut item = self.item(m.candidate, CompletionKind::Keyword, m.score);
                item.detail = Some(kind.summary().to_string());
                Some(item)
            })
            .collect()
    }

    /// Today, yesterday and the last transaction date, written with the
    /// separator already typed and filtered by prefix.
    fn dates(&self, today: NaiveDate) -> Vec<CompletionItem> {
        let query = self.context.query;
        let separator = query.chars().find(|c| matches!(c, '-' | '/' | '.')).unwrap_or('-');
        let format = format!("%Y{}%m{}%d", separator, separator);

        let mut candidates: Vec<(String, &str)> = Vec::new();
        let known = [
            Some((today, "today")),
            today.checked_sub_signed(Duration::days(1)).map(|d| (d, "yesterday")),
            self.kb.last_date().map(|d| (d, "last transaction date")),
        ];
        for (date, detail) in known.into_iter().flatten() {
            let text = date.format(&format).to_string();
            if text.starts_with(query) && !candidates.iter().any(|(seen, _)| *seen == text) {
                candidates.push((text, detail));
            }
        }

        let total = candidates.len() as u32;
        candidates
            .into_iter()
            .enumerate()
            .map(|(n, (text, detail))| {
                let mut item = self.item(&text, CompletionKind::Date, total - n as u32);
                item.detail = Some(detail.to_string());
                item
            })
            .collect()
    }
}
