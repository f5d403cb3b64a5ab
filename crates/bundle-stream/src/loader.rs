//! Process-wide module resolution hook.
//!
//! Config modules are evaluated "as if" the freshly generated code were the
//! file on disk. The hook maps an absolute path to module source; by default
//! it reads the file. [`override_module`] installs a one-shot substitution
//! for exactly one path and returns a guard that reinstalls the previous
//! hook when dropped, whether evaluation returned, failed or panicked.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::{Error, Result};

/// Resolves an absolute module path to its source text.
pub trait ModuleLoader: Send + Sync + fmt::Debug {
    fn load(&self, path: &Path) -> Result<String>;
}

/// Default hook: read the module from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsModuleLoader;

impl ModuleLoader for FsModuleLoader {
    fn load(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("Failed to read module {}: {}", path.display(), e), e))
    }
}

/// Serves `source` for `path` and defers every other path to `fallback`.
#[derive(Debug)]
struct OverrideLoader {
    path: PathBuf,
    source: String,
    fallback: Arc<dyn ModuleLoader>,
}

impl ModuleLoader for OverrideLoader {
    fn load(&self, path: &Path) -> Result<String> {
        if path == self.path {
            Ok(self.source.clone())
        } else {
            self.fallback.load(path)
        }
    }
}

static HOOK: Lazy<RwLock<Arc<dyn ModuleLoader>>> =
    Lazy::new(|| RwLock::new(Arc::new(FsModuleLoader)));

static EXCLUSIVE: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// The currently installed hook.
pub fn current() -> Arc<dyn ModuleLoader> {
    Arc::clone(&HOOK.read())
}

/// Load a module through the installed hook.
pub fn load(path: &Path) -> Result<String> {
    current().load(path)
}

/// Take exclusive control of the hook.
///
/// Held around an override-and-evaluate cycle so concurrent config loads
/// never observe each other's substitutions. Not reentrant.
pub fn exclusive() -> MutexGuard<'static, ()> {
    EXCLUSIVE.lock()
}

/// Restores the previously installed hook on drop.
#[must_use = "the previous hook is restored as soon as the guard is dropped"]
pub struct LoaderGuard {
    previous: Option<Arc<dyn ModuleLoader>>,
}

impl Drop for LoaderGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *HOOK.write() = previous;
            tracing::trace!("module loader hook restored");
        }
    }
}

impl fmt::Debug for LoaderGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderGuard").finish_non_exhaustive()
    }
}

/// Install `loader` as the hook until the guard is dropped.
pub fn install(loader: Arc<dyn ModuleLoader>) -> LoaderGuard {
    let previous = std::mem::replace(&mut *HOOK.write(), loader);
    LoaderGuard {
        previous: Some(previous),
    }
}

/// Serve `source` for exactly `path` until the guard is dropped.
pub fn override_module(path: impl Into<PathBuf>, source: impl Into<String>) -> LoaderGuard {
    let path = path.into();
    tracing::trace!("overriding module loader for {}", path.display());
    let fallback = current();
    install(Arc::new(OverrideLoader {
        path,
        source: source.into(),
        fallback,
    }))
}
