use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const DEFAULT_EXTENSIONS: &[&str] = &[
    "bash", "c", "cc", "cjs", "cpp", "cs", "css", "go", "gradle", "h", "hpp", "html", "java",
    "js", "json", "jsx", "kt", "kts", "lua", "md", "mjs", "php", "proto", "py", "rb", "rs",
    "scala", "scss", "sh", "sql", "svelte", "swift", "toml", "ts", "tsx", "vue", "xml", "yaml",
    "yml", "zig",
];

const DEFAULT_FILENAMES: &[&str] = &[
    "BUILD",
    "CMakeLists.txt",
    "Dockerfile",
    "Gemfile",
    "Jenkinsfile",
    "Makefile",
    "Procfile",
    "Rakefile",
    "Vagrantfile",
    "WORKSPACE",
];

/// Decides which repository paths are eligible for indexing.
///
/// A path is eligible when its extension is listed (case-insensitive) or
/// when its last component exactly equals a listed filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowlist {
    /// Extensions without the leading dot, lowercase
    #[serde(default)]
    pub extensions: BTreeSet<String>,

    /// Exact file names, for extensionless files like `Makefile`
    #[serde(default)]
    pub filenames: BTreeSet<String>,
}

impl Default for Allowlist {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            filenames: DEFAULT_FILENAMES.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

impl Allowlist {
    pub fn new<E, F>(extensions: E, filenames: F) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            filenames: filenames
                .into_iter()
                .map(|f| f.as_ref().to_string())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.filenames.is_empty()
    }

    /// Extension pass
    pub fn matches_extension(&self, relative_path: &str) -> bool {
        let name = file_name(relative_path);
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.extensions.contains(&ext.to_ascii_lowercase())
            }
            _ => false,
        }
    }

    /// Exact filename pass
    pub fn matches_filename(&self, relative_path: &str) -> bool {
        self.filenames.contains(file_name(relative_path))
    }

    pub fn is_eligible(&self, relative_path: &str) -> bool {
        self.matches_extension(relative_path) || self.matches_filename(relative_path)
    }
}

fn file_name(relative_path: &str) -> &str {
    relative_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(relative_path)
}
