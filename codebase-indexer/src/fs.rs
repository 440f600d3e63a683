use crate::config::IndexerConfig;
use async_trait::async_trait;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::{Match, WalkBuilder};
use log::{debug, warn};
use std::io;
use std::path::{Component, Path, PathBuf};

/// File system boundary of the indexer.
///
/// Paths crossing this boundary are workspace-relative and use forward
/// slashes, whatever the host platform.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Every regular file under the workspace that is not ignored
    async fn list_files(&self) -> io::Result<Vec<String>>;

    /// Raw bytes of one file
    async fn read(&self, relative_path: &str) -> io::Result<Vec<u8>>;

    /// Absolute on-disk location of a relative path
    fn absolute_path(&self, relative_path: &str) -> PathBuf;

    /// Whether `list_files` would skip this path, whether or not it exists
    fn is_excluded(&self, relative_path: &str) -> bool;
}

/// [`FileSystem`] over a local directory, honouring `.gitignore`
pub struct LocalFileSystem {
    root: PathBuf,
    ignore_patterns: Vec<String>,
    excluded_dirs: Vec<PathBuf>,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>, ignore_patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns,
            excluded_dirs: Vec::new(),
        }
    }

    /// Workspace view for an indexer; never lists the index directory itself
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self::new(config.root_dir.clone(), config.ignore_patterns.clone())
            .exclude_dir(config.index_dir())
    }

    pub fn exclude_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded_dirs.push(dir.into());
        self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn list_files(&self) -> io::Result<Vec<String>> {
        let root = self.root.clone();
        let patterns = self.ignore_patterns.clone();
        let excluded = self.excluded_dirs.clone();

        tokio::task::spawn_blocking(move || walk(&root, &patterns, excluded))
            .await
            .map_err(io::Error::other)?
    }

    async fn read(&self, relative_path: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.absolute_path(relative_path)).await
    }

    fn absolute_path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    fn is_excluded(&self, relative_path: &str) -> bool {
        let relative = Path::new(relative_path);
        let absolute = self.root.join(relative);

        if self.excluded_dirs.iter().any(|dir| absolute.starts_with(dir))
            || relative.components().any(|c| c.as_os_str() == ".git")
        {
            return true;
        }

        let overrides = match build_overrides(&self.root, &self.ignore_patterns) {
            Ok(overrides) => overrides,
            Err(e) => {
                warn!("Invalid ignore pattern: {e}");
                return false;
            }
        };
        // Directory patterns match a parent, so every prefix is checked
        let components: Vec<Component> = relative.components().collect();
        let mut prefix = self.root.clone();
        for (i, component) in components.iter().enumerate() {
            prefix.push(component);
            let is_dir = i + 1 < components.len();
            if overrides.matched(&prefix, is_dir).is_ignore() {
                return true;
            }
        }

        is_gitignored(&self.root, &absolute)
    }
}

fn build_overrides(root: &Path, ignore_patterns: &[String]) -> io::Result<Override> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in ignore_patterns {
        overrides
            .add(&format!("!{pattern}"))
            .map_err(io::Error::other)?;
    }
    overrides.build().map_err(io::Error::other)
}

/// `.gitignore` files from the file's directory up to `root`, the nearest
/// decisive match winning, then `.git/info/exclude`
fn is_gitignored(root: &Path, absolute: &Path) -> bool {
    for dir in absolute.ancestors().skip(1) {
        if !dir.starts_with(root) {
            break;
        }
        let (matcher, _) = Gitignore::new(dir.join(".gitignore"));
        match matcher.matched_path_or_any_parents(absolute, false) {
            Match::Ignore(_) => return true,
            Match::Whitelist(_) => return false,
            Match::None => {}
        }
    }

    let mut exclude = GitignoreBuilder::new(root);
    if let Some(e) = exclude.add(root.join(".git").join("info").join("exclude")) {
        debug!("No git exclude file: {e}");
    }
    exclude
        .build()
        .is_ok_and(|matcher| matcher.matched_path_or_any_parents(absolute, false).is_ignore())
}

fn walk(root: &Path, ignore_patterns: &[String], excluded: Vec<PathBuf>) -> io::Result<Vec<String>> {
    let overrides = build_overrides(root, ignore_patterns)?;

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .require_git(false)
        .overrides(overrides)
        .filter_entry(move |entry| {
            entry.file_name() != ".git" && !excluded.iter().any(|dir| entry.path().starts_with(dir))
        });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        match entry.path().strip_prefix(root) {
            Ok(relative) => files.push(normalize_relative_path(relative)),
            Err(_) => debug!("Entry outside root: {}", entry.path().display()),
        }
    }

    files.sort();
    Ok(files)
}

/// Forward-slash form of a relative path, without `./` segments
pub fn normalize_relative_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a caller-supplied path inside the workspace, lexically.
///
/// `None` when the path is absolute or climbs above the workspace root.
pub fn resolve_relative_str(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(&path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.join("/"))
}
