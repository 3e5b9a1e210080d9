//! journal-assist - Completion engine for plain text double-entry accounting journals
//! ---
//!
//! Reads hledger/ledger style journals and answers "what is being typed here?" with
//! usage-ranked suggestions for accounts, payees, tags, tag values, commodities, dates,
//! directive keywords and whole transaction skeletons.
//!
//! The flow of one request is: workspace knowledge from the [`cache`], overlaid with the
//! live document by [`merge`], the cursor line classified by [`context`], and the
//! candidates ranked by [`fuzzy`]. [`completion::CompletionEngine`] wires these together.
//!

extern crate pest;
#[macro_use]
extern crate pest_derive;

/// Hierarchical account helpers, e.g. the parents of `Assets:Bank:Cash`.
pub mod account;

/// Commodity extraction from posting amounts.
pub mod amount;

pub mod cache;
pub mod completion;
pub mod config;

/// Classification of the text before the cursor.
///
/// Rules are tried in a fixed order and the first one that applies decides the
/// kind of entity and the query. The order settles ambiguous prefixes, so a line
/// holding only `2024` is a date being typed rather than a keyword.
pub mod context;

pub mod error;
pub mod fuzzy;

/// Facts extracted from journal text: declarations, usage counters and templates.
pub mod knowledge;

/// Line lexer. Every line becomes a [`lexer::Token`]; lines that do not parse
/// become [`lexer::Token::Unknown`] instead of an error.
pub mod lexer;

pub mod merge;
pub mod names;

/// Pest grammar entrypoint.
pub mod parser;

pub mod template;
pub mod usage;
pub mod workspace;

pub use completion::{
    CompletionEngine, CompletionItem, CompletionKind, CompletionRequest, TextRange,
};
pub use config::EngineConfig;
pub use context::{classify, CompletionContext, ContextKind};
pub use error::Error;
pub use fuzzy::{fuzzy_match, FuzzyMatch, MatchOptions};
pub use knowledge::{parse_content, KnowledgeBase};
pub use lexer::tokenize_line;
pub use merge::overlay_document;
pub use names::{AccountName, CommodityName, PayeeName, TagName};
pub use workspace::{parse_workspace, resolve_project_root, DocumentId, ProjectRoot};
