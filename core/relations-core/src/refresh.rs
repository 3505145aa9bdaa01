//! Full and incremental (re)indexing passes over every item type and
//! analyzer language.

use crate::clock::Clock;
use crate::directory::{DirectoryManager, IndexDirectory};
use crate::entity::{uid, EntitySource, EntityType, IndexedEntity};
use crate::error::IndexResult;
use crate::helpers::{default_helpers, EntityHelper};
use crate::progress::Progress;
use crate::registration::{Indexer, IndexerRegistration};
use crate::state::{CursorStore, RefreshCursor};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::slice;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Scanning(EntityType),
    Committing(EntityType, String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    ChangedSince(RefreshCursor),
    Everything,
}

impl Scope {
    fn since(&self) -> Option<DateTime<Utc>> {
        match self {
            Scope::ChangedSince(cursor) => Some(cursor.last_indexed),
            Scope::Everything => None,
        }
    }
}

/// Bookkeeping for one pass.
#[derive(Debug)]
struct RefreshRun {
    started: DateTime<Utc>,
    indexed: HashSet<String>,
    /// Indexed items whose last change is exactly `started`.
    boundary: BTreeSet<String>,
    cancelled: bool,
}

impl RefreshRun {
    fn new(started: DateTime<Utc>) -> Self {
        Self {
            started,
            indexed: HashSet::new(),
            boundary: BTreeSet::new(),
            cancelled: false,
        }
    }

    fn record(&mut self, entities: &[IndexedEntity]) {
        for entity in entities {
            let uid = entity.uid();
            if entity.last_change() == self.started {
                self.boundary.insert(uid.clone());
            }
            self.indexed.insert(uid);
        }
    }

    fn cursor(self) -> RefreshCursor {
        RefreshCursor {
            last_indexed: self.started,
            boundary: self.boundary,
        }
    }
}

pub struct RefreshEngine {
    registration: Arc<IndexerRegistration>,
    directories: Arc<DirectoryManager>,
    source: Arc<dyn EntitySource>,
    cursor: Arc<dyn CursorStore>,
    clock: Arc<dyn Clock>,
    helpers: Vec<Box<dyn EntityHelper>>,
    state: Mutex<RefreshState>,
    run_lock: Mutex<()>,
}

impl RefreshEngine {
    pub fn new(
        registration: Arc<IndexerRegistration>,
        directories: Arc<DirectoryManager>,
        source: Arc<dyn EntitySource>,
        cursor: Arc<dyn CursorStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registration,
            directories,
            source,
            cursor,
            clock,
            helpers: default_helpers(),
            state: Mutex::new(RefreshState::Idle),
            run_lock: Mutex::new(()),
        }
    }

    /// Replaces the per-type helpers; they are processed in the given order.
    pub fn with_helpers(mut self, helpers: Vec<Box<dyn EntityHelper>>) -> Self {
        self.helpers = helpers;
        self
    }

    pub fn state(&self) -> RefreshState {
        self.state.lock().clone()
    }

    pub fn last_indexed(&self) -> IndexResult<Option<DateTime<Utc>>> {
        Ok(self.cursor.load()?.map(|cursor| cursor.last_indexed))
    }

    /// Indexes every item created or modified since the last successful
    /// pass, into every language's index. The first pass, and any pass that
    /// finds a language index missing, indexes everything. Returns the
    /// number of distinct items indexed.
    pub fn refresh_index(&self, progress: &dyn Progress) -> IndexResult<usize> {
        let _run = self.run_lock.lock();
        let indexer = self.registration.indexer()?;
        let started = self.clock.now();
        let cursor = self.cursor.load()?;

        let mut directories = Vec::new();
        let mut any_created = false;
        for language in indexer.analyzer_languages() {
            let (directory, created) = self.directories.open_or_create(&language)?;
            if created || cursor.is_none() {
                indexer.initialize_index(&directory)?;
            }
            any_created |= created;
            directories.push(directory);
        }

        let scope = match cursor {
            Some(cursor) if !any_created => Scope::ChangedSince(cursor),
            _ => Scope::Everything,
        };
        info!(
            since = ?scope.since(),
            languages = directories.len(),
            "refreshing search index"
        );
        self.run(indexer.as_ref(), &directories, scope, started, progress)
    }

    /// Recreates every language's index from scratch and indexes all items.
    pub fn initialize_index(&self, progress: &dyn Progress) -> IndexResult<usize> {
        let _run = self.run_lock.lock();
        let indexer = self.registration.indexer()?;
        let started = self.clock.now();

        let mut directories = Vec::new();
        for language in indexer.analyzer_languages() {
            let directory = self.directories.recreate(&language)?;
            indexer.initialize_index(&directory)?;
            directories.push(directory);
        }

        info!(languages = directories.len(), "rebuilding search index");
        self.run(
            indexer.as_ref(),
            &directories,
            Scope::Everything,
            started,
            progress,
        )
    }

    /// Re-indexes a single item in every language index that exists.
    pub fn update_entity(&self, entity: &IndexedEntity) -> IndexResult<()> {
        let _run = self.run_lock.lock();
        let indexer = self.registration.indexer()?;
        let Some(helper) = self.helper_for(entity.entity_type) else {
            warn!(item_type = %entity.entity_type, "no index helper for item type");
            return Ok(());
        };

        for language in indexer.analyzer_languages() {
            // Languages without an index yet get the item on their first refresh.
            if let Some(directory) = self.directories.existing(&language)? {
                indexer.process_indexer(helper, slice::from_ref(entity), &directory)?;
            }
        }
        debug!(uid = %entity.uid(), "updated item in search index");
        Ok(())
    }

    /// Drops a deleted item from every language index.
    pub fn remove_entity(&self, entity_type: EntityType, id: u64) -> IndexResult<()> {
        let _run = self.run_lock.lock();
        let indexer = self.registration.indexer()?;
        let uids = [uid(entity_type, id)];

        for language in indexer.analyzer_languages() {
            if let Some(directory) = self.directories.existing(&language)? {
                indexer.remove_documents(&directory, &uids)?;
            }
        }
        debug!(uid = %uids[0], "removed item from search index");
        Ok(())
    }

    fn helper_for(&self, entity_type: EntityType) -> Option<&dyn EntityHelper> {
        self.helpers
            .iter()
            .find(|helper| helper.entity_type() == entity_type)
            .map(|helper| helper.as_ref())
    }

    fn run(
        &self,
        indexer: &dyn Indexer,
        directories: &[Arc<IndexDirectory>],
        scope: Scope,
        started: DateTime<Utc>,
        progress: &dyn Progress,
    ) -> IndexResult<usize> {
        let timer = Instant::now();
        progress.begin(
            "Refreshing search index",
            self.helpers.len() * directories.len(),
        );

        let mut run = RefreshRun::new(started);
        let outcome = self.scan(indexer, directories, &scope, progress, &mut run);
        progress.done();

        if let Err(err) = outcome {
            self.set_state(RefreshState::Idle);
            error!(error = %err, indexed = run.indexed.len(), "search index refresh failed");
            return Err(err);
        }

        if run.cancelled {
            self.set_state(RefreshState::Cancelled);
            info!(indexed = run.indexed.len(), "search index refresh cancelled");
            return Ok(run.indexed.len());
        }

        let indexed = run.indexed.len();
        self.cursor.store(&run.cursor())?;
        self.set_state(RefreshState::Idle);
        info!(
            indexed,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "search index refresh finished"
        );
        Ok(indexed)
    }

    fn scan(
        &self,
        indexer: &dyn Indexer,
        directories: &[Arc<IndexDirectory>],
        scope: &Scope,
        progress: &dyn Progress,
        run: &mut RefreshRun,
    ) -> IndexResult<()> {
        for helper in &self.helpers {
            if progress.is_cancelled() {
                run.cancelled = true;
                return Ok(());
            }

            let entity_type = helper.entity_type();
            self.set_state(RefreshState::Scanning(entity_type));
            let entities: Vec<IndexedEntity> = match scope {
                Scope::ChangedSince(cursor) => self
                    .source
                    .changed_since(entity_type, cursor.last_indexed)?
                    .into_iter()
                    .filter(|entity| !cursor.covers(&entity.uid(), entity.last_change()))
                    .collect(),
                Scope::Everything => self.source.all(entity_type)?,
            };
            debug!(item_type = %entity_type, count = entities.len(), "scanned items");

            for directory in directories {
                self.set_state(RefreshState::Committing(
                    entity_type,
                    directory.language().code().to_string(),
                ));
                indexer.process_indexer(helper.as_ref(), &entities, directory)?;
                progress.worked(1);
            }

            run.record(&entities);
        }
        Ok(())
    }

    fn set_state(&self, state: RefreshState) {
        *self.state.lock() = state;
    }
}
