// Source resolution and the enabled-source-root cache
//
// Breakpoints anchored to source files are only submitted when their file maps
// into the project, and only resolve while the owning source root is enabled.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRoot {
    pub path: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceRoot {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
        }
    }
}

/// Maps source files to classes and roots. Supplied by the surrounding IDE.
pub trait SourceResolver: Send + Sync {
    /// Binary class name of the type that holds `url:line`
    fn class_name_for_source_location(&self, url: &str, line: i32) -> Option<String>;

    /// Project-relative path of a source file
    fn relative_path_for(&self, url: &str) -> Option<String>;

    /// Source root a file lives under
    fn source_root_for(&self, url: &str) -> Option<String>;

    /// Source file declaring a class, when known
    fn source_url_for_class(&self, _class_name: &str) -> Option<String> {
        None
    }

    fn source_roots(&self) -> Vec<SourceRoot>;
}

/// Outcome of checking a source file against the enabled roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootCheck {
    /// The file is not part of the project
    Unmapped,
    /// The file maps into the project but has no root we know of
    NoRoot,
    Enabled(String),
    Disabled(String),
}

#[derive(Debug, Default)]
struct CachedRoots {
    enabled: HashSet<String>,
    canonical: HashSet<PathBuf>,
}

/// Cached view of the enabled source roots, rebuilt after `invalidate`
pub struct SourceRootCache {
    resolver: Arc<dyn SourceResolver>,
    cached: Mutex<Option<Arc<CachedRoots>>>,
}

impl SourceRootCache {
    pub fn new(resolver: Arc<dyn SourceResolver>) -> Self {
        Self {
            resolver,
            cached: Mutex::new(None),
        }
    }

    /// Drop the cache; called when the root set changes
    pub fn invalidate(&self) {
        debug!("source root cache invalidated");
        *self.cached.lock() = None;
    }

    fn roots(&self) -> Arc<CachedRoots> {
        let mut cached = self.cached.lock();
        if let Some(roots) = cached.as_ref() {
            return roots.clone();
        }

        let mut roots = CachedRoots::default();
        for root in self.resolver.source_roots().into_iter().filter(|r| r.enabled) {
            roots.canonical.insert(canonical(&root.path));
            roots.enabled.insert(root.path);
        }
        let roots = Arc::new(roots);
        *cached = Some(roots.clone());
        roots
    }

    pub fn is_enabled(&self, root: &str) -> bool {
        let roots = self.roots();
        roots.enabled.contains(root) || roots.canonical.contains(&canonical(root))
    }

    pub fn enabled_roots(&self) -> Vec<String> {
        let mut roots: Vec<_> = self.roots().enabled.iter().cloned().collect();
        roots.sort();
        roots
    }

    pub fn check(&self, url: &str) -> RootCheck {
        if self.resolver.relative_path_for(url).is_none() {
            return RootCheck::Unmapped;
        }
        match self.resolver.source_root_for(url) {
            None => RootCheck::NoRoot,
            Some(root) if self.is_enabled(&root) => RootCheck::Enabled(root),
            Some(root) => RootCheck::Disabled(root),
        }
    }

    pub fn resolver(&self) -> &Arc<dyn SourceResolver> {
        &self.resolver
    }
}

impl std::fmt::Debug for SourceRootCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRootCache")
            .field("cached", &self.cached.lock().is_some())
            .finish()
    }
}

fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

fn canonical(path: &str) -> PathBuf {
    let path = Path::new(strip_file_scheme(path));
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Source resolver over a list of directory roots.
///
/// `root/com/example/Foo.java` maps to class `com.example.Foo`.
#[derive(Debug, Default)]
pub struct DirectorySourceResolver {
    roots: RwLock<Vec<SourceRoot>>,
}

impl DirectorySourceResolver {
    pub fn new(roots: Vec<SourceRoot>) -> Self {
        Self {
            roots: RwLock::new(roots),
        }
    }

    pub fn set_root_enabled(&self, path: &str, enabled: bool) -> bool {
        let mut roots = self.roots.write();
        match roots.iter_mut().find(|r| r.path == path) {
            Some(root) => {
                root.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn split<'a>(&self, url: &'a str) -> Option<(String, &'a str)> {
        let file = strip_file_scheme(url);
        let roots = self.roots.read();
        roots
            .iter()
            .filter_map(|root| {
                let prefix = root.path.trim_end_matches('/');
                let rest = file.strip_prefix(prefix)?.strip_prefix('/')?;
                Some((root.path.clone(), rest))
            })
            // Longest root wins for nested roots
            .max_by_key(|(root, _)| root.len())
    }
}

impl SourceResolver for DirectorySourceResolver {
    fn class_name_for_source_location(&self, url: &str, _line: i32) -> Option<String> {
        let (_, relative) = self.split(url)?;
        let stem = relative
            .strip_suffix(".java")
            .or_else(|| relative.strip_suffix(".kt"))?;
        Some(stem.replace('/', "."))
    }

    fn relative_path_for(&self, url: &str) -> Option<String> {
        self.split(url).map(|(_, rest)| rest.to_string())
    }

    fn source_root_for(&self, url: &str) -> Option<String> {
        self.split(url).map(|(root, _)| root)
    }

    fn source_url_for_class(&self, class_name: &str) -> Option<String> {
        // Nested classes live in their outer class's file
        let top_level = class_name.split('$').next().unwrap_or(class_name);
        let relative = format!("{}.java", top_level.replace('.', "/"));
        let roots = self.roots.read();
        let root = roots.iter().find(|root| {
            Path::new(strip_file_scheme(&root.path))
                .join(&relative)
                .exists()
        })?;
        Some(format!("{}/{}", root.path.trim_end_matches('/'), relative))
    }

    fn source_roots(&self) -> Vec<SourceRoot> {
        self.roots.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> Arc<DirectorySourceResolver> {
        Arc::new(DirectorySourceResolver::new(vec![
            SourceRoot::new("/work/app/src/main/java"),
            SourceRoot::new("/work/app/src/test/java"),
        ]))
    }

    #[test]
    fn test_class_name_from_path() {
        let r = resolver();
        assert_eq!(
            r.class_name_for_source_location("/work/app/src/main/java/com/example/Foo.java", 3),
            Some("com.example.Foo".to_string())
        );
        assert_eq!(
            r.class_name_for_source_location("file:///work/app/src/test/java/FooTest.java", 3),
            Some("FooTest".to_string())
        );
        assert_eq!(r.class_name_for_source_location("/elsewhere/Foo.java", 3), None);
    }

    #[test]
    fn test_root_check_follows_enablement() {
        let r = resolver();
        let cache = SourceRootCache::new(r.clone());
        let url = "/work/app/src/main/java/com/example/Foo.java";

        assert_eq!(
            cache.check(url),
            RootCheck::Enabled("/work/app/src/main/java".to_string())
        );

        r.set_root_enabled("/work/app/src/main/java", false);
        // Still cached until invalidated
        assert!(matches!(cache.check(url), RootCheck::Enabled(_)));

        cache.invalidate();
        assert_eq!(
            cache.check(url),
            RootCheck::Disabled("/work/app/src/main/java".to_string())
        );
        assert_eq!(cache.check("/tmp/Other.java"), RootCheck::Unmapped);
    }

    #[test]
    fn test_class_url_lookup_uses_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("src");
        std::fs::create_dir_all(root.join("com/example")).unwrap();
        std::fs::write(root.join("com/example/Foo.java"), "class Foo {}").unwrap();

        let root = root.to_string_lossy().to_string();
        let r = DirectorySourceResolver::new(vec![SourceRoot::new(root.clone())]);
        assert_eq!(
            r.source_url_for_class("com.example.Foo$Inner"),
            Some(format!("{}/com/example/Foo.java", root))
        );
        assert_eq!(r.source_url_for_class("com.example.Missing"), None);
    }
}
