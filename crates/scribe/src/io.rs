//! Injected capabilities: source loading and process environment.
//!
//! The core never touches the filesystem or environment directly; the host
//! hands it a [`SourceLoader`] and an [`Env`]. Tests use [`MapLoader`] to
//! compile multi-module programs fully in memory.

use ahash::AHashMap;

/// Read access to module sources keyed by path.
pub trait SourceLoader {
    fn exists(&self, path: &str) -> bool;

    /// Reads the whole file. The error string is host-facing.
    fn read(&self, path: &str) -> Result<String, String>;
}

/// Loader backed by the real filesystem.
#[derive(Default)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn exists(&self, path: &str) -> bool {
        std::path::Path::new(path).exists()
    }

    fn read(&self, path: &str) -> Result<String, String> {
        std::fs::read_to_string(path).map_err(|e| format!("failed to open source file {path}: {e}"))
    }
}

/// In-memory loader for tests and embedded use.
#[derive(Default)]
pub struct MapLoader {
    files: AHashMap<String, String>,
}

impl MapLoader {
    pub fn new<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            files: files.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn insert(&mut self, path: impl Into<String>, code: impl Into<String>) {
        self.files.insert(path.into(), code.into());
    }
}

impl SourceLoader for MapLoader {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &str) -> Result<String, String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| format!("failed to open source file {path}: not found"))
    }
}

/// The slice of the process environment the import resolver needs.
#[derive(Debug, Clone, Default)]
pub struct Env {
    /// Expansion target for `~`-prefixed imports.
    pub home: Option<String>,
    /// Search directory for bare imports (`<install>/lib/scribe`).
    pub lib_dir: Option<String>,
}

impl Env {
    /// Builds an `Env` from the real process: `HOME` plus the lib directory
    /// next to the running executable.
    pub fn from_process() -> Self {
        let home = std::env::var("HOME").ok();
        let lib_dir = std::env::current_exe().ok().and_then(|exe| {
            let install = exe.parent()?.parent()?;
            Some(install.join("lib").join("scribe").to_string_lossy().into_owned())
        });
        Self { home, lib_dir }
    }
}
