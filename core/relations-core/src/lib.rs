//! Full-text search over the items of a Relations database: per-language
//! Tantivy indexes kept current by an incremental refresh engine.

pub mod clock;
pub mod config;
pub mod directory;
pub mod entity;
mod error;
pub mod helpers;
mod indexer;
pub mod language;
pub mod progress;
mod query;
pub mod refresh;
pub mod registration;
pub mod schema;
mod service;
pub mod state;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{IndexSettings, SearchConfig};
pub use crate::directory::{DirectoryLocation, DirectoryManager, IndexDirectory, WriterSession};
pub use crate::entity::{uid, EntitySource, EntityType, IndexedEntity, MemorySource};
pub use crate::error::{IndexError, IndexResult};
pub use crate::helpers::{default_helpers, EntityHelper, PersonHelper, TermHelper, TextHelper};
pub use crate::indexer::TantivyIndexer;
pub use crate::language::{parse_languages, AnalyzerLanguage};
pub use crate::progress::{CancelFlag, NullProgress, Progress};
pub use crate::query::{search, ResultItem, SearchQuery};
pub use crate::refresh::{RefreshEngine, RefreshState};
pub use crate::registration::{Indexer, IndexerRegistration};
pub use crate::schema::{build_schema, FieldKind, IndexDocument, IndexField};
pub use crate::service::{LanguageStats, SearchService};
pub use crate::state::{CursorStore, FileCursorStore, MemoryCursorStore, RefreshCursor};
