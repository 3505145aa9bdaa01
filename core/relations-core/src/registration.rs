use crate::directory::IndexDirectory;
use crate::entity::IndexedEntity;
use crate::error::{IndexError, IndexResult};
use crate::helpers::EntityHelper;
use crate::language::AnalyzerLanguage;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A backend able to build the full-text index for each analyzer language.
pub trait Indexer: Send + Sync {
    fn name(&self) -> &str;

    /// Analyzer languages this indexer maintains an index for, in order.
    fn analyzer_languages(&self) -> Vec<AnalyzerLanguage>;

    /// Prepares a freshly created or recreated directory.
    fn initialize_index(&self, directory: &IndexDirectory) -> IndexResult<()>;

    /// Writes the documents for `entities` (all of `helper`'s type) and
    /// commits. Called once per type and language in a refresh pass, also
    /// when `entities` is empty.
    fn process_indexer(
        &self,
        helper: &dyn EntityHelper,
        entities: &[IndexedEntity],
        directory: &IndexDirectory,
    ) -> IndexResult<usize>;

    /// Removes the documents with the given unique keys and commits.
    fn remove_documents(&self, directory: &IndexDirectory, uids: &[String]) -> IndexResult<()>;
}

/// Holds the single active [`Indexer`]. Built once at startup and shared by
/// handle with everything that indexes or searches.
#[derive(Default)]
pub struct IndexerRegistration {
    active: RwLock<Option<Arc<dyn Indexer>>>,
}

impl IndexerRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `indexer` the active implementation, replacing any other.
    pub fn register(&self, indexer: Arc<dyn Indexer>) {
        let mut active = self.active.write();
        if let Some(previous) = active.as_ref() {
            warn!(
                previous = previous.name(),
                next = indexer.name(),
                "replacing registered indexer"
            );
        }
        info!(indexer = indexer.name(), "indexer registered");
        *active = Some(indexer);
    }

    /// Clears the registration if `indexer` is the one registered. Returns
    /// whether anything was removed.
    pub fn unregister(&self, indexer: &Arc<dyn Indexer>) -> bool {
        let mut active = self.active.write();
        match active.as_ref() {
            Some(current) if same_instance(current, indexer) => {
                info!(indexer = indexer.name(), "indexer unregistered");
                *active = None;
                true
            }
            Some(current) => {
                warn!(
                    registered = current.name(),
                    requested = indexer.name(),
                    "ignoring unregister of an indexer that is not registered"
                );
                false
            }
            None => false,
        }
    }

    /// Drops whatever indexer is registered, if any.
    pub fn clear(&self) {
        if let Some(previous) = self.active.write().take() {
            info!(indexer = previous.name(), "indexer registration cleared");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn indexer(&self) -> IndexResult<Arc<dyn Indexer>> {
        match self.active.read().as_ref() {
            Some(indexer) => Ok(indexer.clone()),
            None => {
                error!("no indexer registered; search indexing is unavailable");
                Err(IndexError::ServiceUnavailable)
            }
        }
    }

    pub fn content_languages(&self) -> IndexResult<Vec<AnalyzerLanguage>> {
        Ok(self.indexer()?.analyzer_languages())
    }
}

fn same_instance(a: &Arc<dyn Indexer>, b: &Arc<dyn Indexer>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::{Indexer, IndexerRegistration};
    use crate::directory::IndexDirectory;
    use crate::entity::IndexedEntity;
    use crate::error::{IndexError, IndexResult};
    use crate::helpers::EntityHelper;
    use crate::language::{parse_languages, AnalyzerLanguage};
    use std::sync::Arc;

    struct Named(&'static str, Vec<&'static str>);

    impl Indexer for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn analyzer_languages(&self) -> Vec<AnalyzerLanguage> {
            parse_languages(&self.1).unwrap()
        }

        fn initialize_index(&self, _directory: &IndexDirectory) -> IndexResult<()> {
            Ok(())
        }

        fn process_indexer(
            &self,
            _helper: &dyn EntityHelper,
            entities: &[IndexedEntity],
            _directory: &IndexDirectory,
        ) -> IndexResult<usize> {
            Ok(entities.len())
        }

        fn remove_documents(&self, _directory: &IndexDirectory, _uids: &[String]) -> IndexResult<()> {
            Ok(())
        }
    }

    #[test]
    fn lookup_fails_until_registered() {
        let registration = IndexerRegistration::new();
        assert!(matches!(
            registration.indexer(),
            Err(IndexError::ServiceUnavailable)
        ));
        assert!(matches!(
            registration.content_languages(),
            Err(IndexError::ServiceUnavailable)
        ));

        let indexer: Arc<dyn Indexer> = Arc::new(Named("lucene", vec!["en", "de"]));
        registration.register(indexer.clone());
        assert!(Arc::ptr_eq(&registration.indexer().unwrap(), &indexer));
        let codes: Vec<String> = registration
            .content_languages()
            .unwrap()
            .iter()
            .map(|l| l.code().to_string())
            .collect();
        assert_eq!(codes, vec!["en", "de"]);

        assert!(registration.unregister(&indexer));
        assert!(matches!(
            registration.indexer(),
            Err(IndexError::ServiceUnavailable)
        ));
    }

    #[test]
    fn last_registration_wins() {
        let registration = IndexerRegistration::new();
        let first: Arc<dyn Indexer> = Arc::new(Named("first", vec!["en"]));
        let second: Arc<dyn Indexer> = Arc::new(Named("second", vec!["fr"]));
        registration.register(first);
        registration.register(second.clone());
        assert_eq!(registration.indexer().unwrap().name(), "second");
    }

    #[test]
    fn unregister_requires_the_registered_instance() {
        let registration = IndexerRegistration::new();
        let active: Arc<dyn Indexer> = Arc::new(Named("active", vec!["en"]));
        let stranger: Arc<dyn Indexer> = Arc::new(Named("active", vec!["en"]));
        registration.register(active.clone());

        assert!(!registration.unregister(&stranger));
        assert!(registration.is_registered());
        assert!(registration.unregister(&active));
        assert!(!registration.is_registered());
        assert!(!registration.unregister(&active));
    }

    #[test]
    fn clear_ignores_identity() {
        let registration = IndexerRegistration::new();
        registration.register(Arc::new(Named("any", vec!["en"])));
        registration.clear();
        assert!(!registration.is_registered());
        registration.clear();
    }
}
