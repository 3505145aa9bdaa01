use crate::clock::{Clock, SystemClock};
use crate::config::SearchConfig;
use crate::directory::{DirectoryLocation, DirectoryManager};
use crate::entity::{EntitySource, EntityType, IndexedEntity};
use crate::error::IndexResult;
use crate::indexer::TantivyIndexer;
use crate::language::{parse_languages, AnalyzerLanguage};
use crate::progress::Progress;
use crate::query::{self, ResultItem, SearchQuery};
use crate::refresh::{RefreshEngine, RefreshState};
use crate::registration::{Indexer, IndexerRegistration};
use crate::state::{CursorStore, FileCursorStore, MemoryCursorStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Document count of one language's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageStats {
    pub language: String,
    pub documents: u64,
}

/// Everything the application needs for search: construct once at startup
/// and share by reference.
pub struct SearchService {
    registration: Arc<IndexerRegistration>,
    directories: Arc<DirectoryManager>,
    engine: RefreshEngine,
    default_limit: usize,
}

impl SearchService {
    /// Builds the service and registers a [`TantivyIndexer`] for the
    /// configured languages.
    pub fn new(config: &SearchConfig, source: Arc<dyn EntitySource>) -> IndexResult<Self> {
        Self::with_clock(config, source, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &SearchConfig,
        source: Arc<dyn EntitySource>,
        clock: Arc<dyn Clock>,
    ) -> IndexResult<Self> {
        let languages = parse_languages(&config.languages)?;
        let registration = Arc::new(IndexerRegistration::new());
        registration.register(Arc::new(TantivyIndexer::new(languages, config.writer)));

        let location = match &config.index_root {
            Some(root) => DirectoryLocation::Disk(root.clone()),
            None => DirectoryLocation::Memory,
        };
        let directories = Arc::new(DirectoryManager::new(location));

        let cursor: Arc<dyn CursorStore> = match config.state_path() {
            Some(path) => Arc::new(FileCursorStore::new(path)),
            None => Arc::new(MemoryCursorStore::new()),
        };

        let engine = RefreshEngine::new(
            registration.clone(),
            directories.clone(),
            source,
            cursor,
            clock,
        );

        Ok(Self {
            registration,
            directories,
            engine,
            default_limit: config.default_limit,
        })
    }

    /// Handle for swapping the active indexer at runtime.
    pub fn registration(&self) -> &Arc<IndexerRegistration> {
        &self.registration
    }

    pub fn register_indexer(&self, indexer: Arc<dyn Indexer>) {
        self.registration.register(indexer);
    }

    pub fn languages(&self) -> IndexResult<Vec<AnalyzerLanguage>> {
        self.registration.content_languages()
    }

    pub fn refresh_index(&self, progress: &dyn Progress) -> IndexResult<usize> {
        self.engine.refresh_index(progress)
    }

    pub fn initialize_index(&self, progress: &dyn Progress) -> IndexResult<usize> {
        self.engine.initialize_index(progress)
    }

    pub fn update_entity(&self, entity: &IndexedEntity) -> IndexResult<()> {
        self.engine.update_entity(entity)
    }

    pub fn remove_entity(&self, entity_type: EntityType, id: u64) -> IndexResult<()> {
        self.engine.remove_entity(entity_type, id)
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.engine.state()
    }

    pub fn last_indexed(&self) -> IndexResult<Option<DateTime<Utc>>> {
        self.engine.last_indexed()
    }

    pub fn search(&self, text: &str, language: &str) -> IndexResult<Vec<ResultItem>> {
        let query = SearchQuery::new(text, language).with_limit(self.default_limit);
        query::search(&self.directories, &query)
    }

    pub fn search_with(&self, query: &SearchQuery) -> IndexResult<Vec<ResultItem>> {
        query::search(&self.directories, query)
    }

    /// Per-language document counts; languages never indexed report zero.
    pub fn stats(&self) -> IndexResult<Vec<LanguageStats>> {
        let mut stats = Vec::new();
        for language in self.languages()? {
            let documents = self
                .directories
                .existing(&language)?
                .map(|directory| directory.num_docs())
                .unwrap_or(0);
            stats.push(LanguageStats {
                language: language.code().to_string(),
                documents,
            });
        }
        Ok(stats)
    }
}
