use crate::config::IndexSettings;
use crate::directory::IndexDirectory;
use crate::entity::IndexedEntity;
use crate::error::IndexResult;
use crate::helpers::EntityHelper;
use crate::language::AnalyzerLanguage;
use crate::registration::Indexer;
use tracing::debug;

/// The tantivy-backed [`Indexer`], configured with its analyzer languages.
pub struct TantivyIndexer {
    languages: Vec<AnalyzerLanguage>,
    settings: IndexSettings,
}

impl TantivyIndexer {
    pub fn new(languages: Vec<AnalyzerLanguage>, settings: IndexSettings) -> Self {
        Self {
            languages,
            settings,
        }
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }
}

impl Indexer for TantivyIndexer {
    fn name(&self) -> &str {
        "tantivy"
    }

    fn analyzer_languages(&self) -> Vec<AnalyzerLanguage> {
        self.languages.clone()
    }

    fn initialize_index(&self, directory: &IndexDirectory) -> IndexResult<()> {
        // An empty commit leaves a valid, searchable index behind.
        directory.writer(&self.settings)?.commit()?;
        Ok(())
    }

    fn process_indexer(
        &self,
        helper: &dyn EntityHelper,
        entities: &[IndexedEntity],
        directory: &IndexDirectory,
    ) -> IndexResult<usize> {
        let mut session = directory.writer(&self.settings)?;
        for entity in entities {
            session.replace(&helper.document(entity))?;
        }
        let added = session.commit()?;
        debug!(
            item_type = %helper.entity_type(),
            language = %directory.language(),
            added,
            "processed indexer batch"
        );
        Ok(added)
    }

    fn remove_documents(&self, directory: &IndexDirectory, uids: &[String]) -> IndexResult<()> {
        let mut session = directory.writer(&self.settings)?;
        for uid in uids {
            session.delete(uid);
        }
        session.commit()?;
        Ok(())
    }
}
