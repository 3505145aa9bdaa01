use crate::config::IndexSettings;
use crate::error::{IndexError, IndexResult};
use crate::language::{AnalyzerLanguage, ANALYZER_NAME};
use crate::schema::{build_schema, IndexDocument, IndexFields, UID};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tantivy::directory::{MmapDirectory, RamDirectory};
use tantivy::merge_policy::LogMergePolicy;
use tantivy::schema::Schema;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError, Term};
use tracing::{debug, error, info, warn};

pub(crate) struct OpenIndex {
    pub index: Index,
    pub reader: IndexReader,
    pub schema: Schema,
    pub fields: IndexFields,
}

/// One language's index. Queries share `state`; recreation takes it
/// exclusively. Writer sessions are serialized by `writer_lock`, which is
/// always taken before `state`.
pub struct IndexDirectory {
    language: AnalyzerLanguage,
    path: Option<PathBuf>,
    writer_lock: Mutex<()>,
    state: RwLock<OpenIndex>,
    /// Set when a failed recreate could not restore the on-disk index.
    unavailable: AtomicBool,
}

impl IndexDirectory {
    /// Opens the index stored at `path`, creating the location and an empty
    /// index if needed.
    pub fn open(path: &Path, language: AnalyzerLanguage) -> IndexResult<Self> {
        let state = open_index(Some(path), &language)?;
        Ok(Self {
            language,
            path: Some(path.to_path_buf()),
            writer_lock: Mutex::new(()),
            state: RwLock::new(state),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn in_memory(language: AnalyzerLanguage) -> IndexResult<Self> {
        let state = open_index(None, &language)?;
        Ok(Self {
            language,
            path: None,
            writer_lock: Mutex::new(()),
            state: RwLock::new(state),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn language(&self) -> &AnalyzerLanguage {
        &self.language
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn num_docs(&self) -> u64 {
        self.state.read().reader.searcher().num_docs()
    }

    /// Throws away the current contents and starts over with an empty index.
    pub fn recreate(&self) -> IndexResult<()> {
        self.recreate_with(remove_index_files)
    }

    fn recreate_with<F>(&self, remove: F) -> IndexResult<()>
    where
        F: FnOnce(&Path) -> std::io::Result<()>,
    {
        let _exclusive = self.writer_lock.lock();
        let mut state = self.state.write();

        let Some(path) = &self.path else {
            *state = open_index(None, &self.language)?;
            info!(language = %self.language, "recreated in-memory index");
            return Ok(());
        };

        // Release the old readers and mmaps before their files disappear.
        *state = open_index(None, &self.language)?;
        let fresh = remove(path)
            .map_err(|err| IndexError::io(path, err))
            .and_then(|()| open_index(Some(path), &self.language));

        match fresh {
            Ok(fresh) => {
                *state = fresh;
                self.unavailable.store(false, Ordering::SeqCst);
                info!(
                    language = %self.language,
                    path = %path.display(),
                    "recreated index directory"
                );
                Ok(())
            }
            Err(err) => {
                // Never leave the placeholder RAM index serving this path.
                match open_index(Some(path), &self.language) {
                    Ok(restored) => {
                        *state = restored;
                        warn!(
                            language = %self.language,
                            path = %path.display(),
                            error = %err,
                            "recreate failed, reopened the existing index"
                        );
                    }
                    Err(reopen) => {
                        self.unavailable.store(true, Ordering::SeqCst);
                        error!(
                            language = %self.language,
                            path = %path.display(),
                            error = %err,
                            reopen_error = %reopen,
                            "recreate failed and the index could not be reopened"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    fn ensure_available(&self) -> IndexResult<()> {
        match &self.path {
            Some(path) if self.unavailable.load(Ordering::SeqCst) => {
                Err(IndexError::DirectoryUnavailable { path: path.clone() })
            }
            _ => Ok(()),
        }
    }

    /// Starts an exclusive write session. Nothing becomes visible until
    /// [`WriterSession::commit`]; dropping the session discards its changes.
    pub fn writer(&self, settings: &IndexSettings) -> IndexResult<WriterSession<'_>> {
        let exclusive = self.writer_lock.lock();
        self.ensure_available()?;
        let open = self.state.read();

        let writer: IndexWriter = open
            .index
            .writer_with_num_threads(settings.threads(), settings.heap_bytes())?;
        let mut merge_policy = LogMergePolicy::default();
        merge_policy.set_level_log_size(1.2);
        writer.set_merge_policy(Box::new(merge_policy));

        Ok(WriterSession {
            _exclusive: exclusive,
            open,
            writer,
            language: &self.language,
            pending: 0,
        })
    }

    pub(crate) fn read(&self) -> IndexResult<RwLockReadGuard<'_, OpenIndex>> {
        let open = self.state.read();
        self.ensure_available()?;
        Ok(open)
    }
}

/// A single writer's lifetime against one [`IndexDirectory`].
pub struct WriterSession<'a> {
    _exclusive: MutexGuard<'a, ()>,
    open: RwLockReadGuard<'a, OpenIndex>,
    writer: IndexWriter,
    language: &'a AnalyzerLanguage,
    pending: usize,
}

impl WriterSession<'_> {
    /// Deletes any document with the same `uid` and adds `document`.
    pub fn replace(&mut self, document: &IndexDocument) -> IndexResult<()> {
        if let Some(uid) = document.get(UID) {
            self.delete(uid);
        }
        let doc = document.to_tantivy(&self.open.schema)?;
        self.writer.add_document(doc)?;
        self.pending += 1;
        Ok(())
    }

    pub fn delete(&mut self, uid: &str) {
        let term = Term::from_field_text(self.open.fields.uid, uid);
        self.writer.delete_term(term);
    }

    /// Commits, makes the changes visible to readers and joins the merge
    /// threads. Returns the number of documents added in this session.
    pub fn commit(self) -> IndexResult<usize> {
        let WriterSession {
            _exclusive,
            open,
            mut writer,
            language,
            pending,
        } = self;

        writer.commit()?;
        open.reader.reload()?;
        writer.wait_merging_threads()?;

        debug!(language = %language, added = pending, "committed index writer session");
        Ok(pending)
    }
}

fn remove_index_files(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn open_index(path: Option<&Path>, language: &AnalyzerLanguage) -> IndexResult<OpenIndex> {
    let schema = build_schema();
    let index = match path {
        Some(path) => {
            fs::create_dir_all(path).map_err(|err| IndexError::io(path, err))?;
            let directory = MmapDirectory::open(path).map_err(TantivyError::from)?;
            Index::open_or_create(directory, schema)?
        }
        None => Index::open_or_create(RamDirectory::create(), schema)?,
    };

    index
        .tokenizers()
        .register(ANALYZER_NAME, language.analyzer());

    let reader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()?;

    let schema = index.schema();
    let fields = IndexFields::resolve(&schema)?;

    Ok(OpenIndex {
        index,
        reader,
        schema,
        fields,
    })
}

fn index_exists(path: &Path) -> IndexResult<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    let directory = MmapDirectory::open(path).map_err(TantivyError::from)?;
    let exists = Index::exists(&directory).map_err(TantivyError::from)?;
    Ok(exists)
}

/// Where the per-language indexes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryLocation {
    /// `<root>/<language code>` for each language.
    Disk(PathBuf),
    Memory,
}

/// Hands out one shared [`IndexDirectory`] per analyzer language.
pub struct DirectoryManager {
    location: DirectoryLocation,
    directories: Mutex<HashMap<String, Arc<IndexDirectory>>>,
}

impl DirectoryManager {
    pub fn new(location: DirectoryLocation) -> Self {
        Self {
            location,
            directories: Mutex::new(HashMap::new()),
        }
    }

    pub fn location(&self) -> &DirectoryLocation {
        &self.location
    }

    pub fn path_for(&self, language: &AnalyzerLanguage) -> Option<PathBuf> {
        match &self.location {
            DirectoryLocation::Disk(root) => Some(root.join(language.code())),
            DirectoryLocation::Memory => None,
        }
    }

    pub fn directory(&self, language: &AnalyzerLanguage) -> IndexResult<Arc<IndexDirectory>> {
        Ok(self.open_or_create(language)?.0)
    }

    /// Like [`directory`](Self::directory), also reporting whether the index
    /// had to be created.
    pub fn open_or_create(
        &self,
        language: &AnalyzerLanguage,
    ) -> IndexResult<(Arc<IndexDirectory>, bool)> {
        let mut directories = self.directories.lock();
        if let Some(existing) = directories.get(language.code()) {
            return Ok((existing.clone(), false));
        }

        let (directory, created) = match self.path_for(language) {
            Some(path) => {
                let created = !index_exists(&path)?;
                (IndexDirectory::open(&path, language.clone())?, created)
            }
            None => (IndexDirectory::in_memory(language.clone())?, true),
        };
        if created {
            info!(language = %language, path = ?directory.path(), "created index directory");
        }

        let directory = Arc::new(directory);
        directories.insert(language.code().to_string(), directory.clone());
        Ok((directory, created))
    }

    /// The directory for `language` only if an index already exists there.
    pub fn existing(&self, language: &AnalyzerLanguage) -> IndexResult<Option<Arc<IndexDirectory>>> {
        {
            let directories = self.directories.lock();
            if let Some(existing) = directories.get(language.code()) {
                return Ok(Some(existing.clone()));
            }
        }
        match self.path_for(language) {
            Some(path) if index_exists(&path)? => Ok(Some(self.directory(language)?)),
            _ => Ok(None),
        }
    }

    pub fn recreate(&self, language: &AnalyzerLanguage) -> IndexResult<Arc<IndexDirectory>> {
        let directory = self.directory(language)?;
        directory.recreate()?;
        Ok(directory)
    }
}
