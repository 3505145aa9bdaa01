use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_WRITER_MEM_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_WRITER_THREADS: usize = 1;
const MIN_WRITER_MEM_PER_THREAD: usize = 16 * 1024 * 1024;
const DEFAULT_LIMIT: usize = 50;
const STATE_FILE_NAME: &str = "index-state.json";

/// Tantivy writer tuning. `writer_threads == 0` means one per CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub writer_threads: usize,
    pub writer_heap_bytes: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            writer_threads: DEFAULT_WRITER_THREADS,
            writer_heap_bytes: DEFAULT_WRITER_MEM_BYTES,
        }
    }
}

impl IndexSettings {
    pub fn threads(&self) -> usize {
        if self.writer_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.writer_threads
        }
    }

    /// Heap budget, raised so every writer thread gets tantivy's minimum.
    pub fn heap_bytes(&self) -> usize {
        self.writer_heap_bytes
            .max(self.threads().saturating_mul(MIN_WRITER_MEM_PER_THREAD))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Parent directory of the per-language indexes; `None` keeps them in memory.
    pub index_root: Option<PathBuf>,
    /// ISO-639 codes of the analyzer languages, in processing order.
    pub languages: Vec<String>,
    pub writer: IndexSettings,
    pub default_limit: usize,
    /// Where the "last indexed" cursor lives; defaults to a file in `index_root`.
    pub state_file: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_root: None,
            languages: vec!["en".to_string()],
            writer: IndexSettings::default(),
            default_limit: DEFAULT_LIMIT,
            state_file: None,
        }
    }
}

impl SearchConfig {
    pub fn on_disk(root: impl Into<PathBuf>, languages: &[&str]) -> Self {
        Self {
            index_root: Some(root.into()),
            languages: languages.iter().map(|code| code.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn in_memory(languages: &[&str]) -> Self {
        Self {
            languages: languages.iter().map(|code| code.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> IndexResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| IndexError::io(path, err))?;
        let config: SearchConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn state_path(&self) -> Option<PathBuf> {
        self.state_file.clone().or_else(|| {
            self.index_root
                .as_ref()
                .map(|root| root.join(STATE_FILE_NAME))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{IndexSettings, SearchConfig, MIN_WRITER_MEM_PER_THREAD};
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn heap_is_raised_to_thread_minimum() {
        let settings = IndexSettings {
            writer_threads: 4,
            writer_heap_bytes: 1024,
        };
        assert_eq!(settings.heap_bytes(), 4 * MIN_WRITER_MEM_PER_THREAD);
        let auto = IndexSettings {
            writer_threads: 0,
            ..IndexSettings::default()
        };
        assert!(auto.threads() >= 1);
    }

    #[test]
    fn loads_partial_json_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("search.json");
        std::fs::write(
            &path,
            r#"{ "index_root": "/data/relations/index", "languages": ["de", "en"] }"#,
        )
        .unwrap();

        let config = SearchConfig::load(&path).unwrap();
        assert_eq!(config.languages, vec!["de", "en"]);
        assert_eq!(config.default_limit, 50);
        assert_eq!(config.writer, IndexSettings::default());
        assert_eq!(
            config.state_path(),
            Some(PathBuf::from("/data/relations/index/index-state.json"))
        );
    }

    #[test]
    fn in_memory_config_has_no_state_file() {
        let config = SearchConfig::in_memory(&["en"]);
        assert_eq!(config.state_path(), None);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = SearchConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, crate::IndexError::Io { .. }));
    }
}
