use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobMatcher};
use log::warn;
use walkdir::WalkDir;

use crate::error::BuildError;

const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// Finds files under a project root that match a glob such as
/// `content/posts/*.md`. `*` never crosses a `/`.
pub struct GlobScanner {
    root: PathBuf,
    base: PathBuf,
    matcher: GlobMatcher,
}

impl GlobScanner {
    pub fn new<P: AsRef<Path>>(root: P, pattern: &str) -> Result<Self, globset::Error> {
        let pattern = pattern.trim_start_matches("./");
        let glob: Glob = GlobBuilder::new(pattern).literal_separator(true).build()?;

        Ok(Self {
            root: root.as_ref().to_path_buf(),
            base: glob_base(pattern),
            matcher: glob.compile_matcher(),
        })
    }

    /// Directory the walk starts from, relative to the root.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Matching files relative to the root, sorted by path.
    pub fn scan(&self) -> Result<Vec<PathBuf>, BuildError> {
        let start = self.root.join(&self.base);
        if !start.exists() {
            warn!("Source directory does not exist: {}", start.display());
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&start).sort_by_file_name() {
            let entry = entry.map_err(|e| BuildError::Scan(start.clone(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if self.matcher.is_match(normalized(relative)) {
                paths.push(relative.to_path_buf());
            }
        }

        paths.sort();
        Ok(paths)
    }
}

/// Leading path components of `pattern` that contain no glob syntax.
pub fn glob_base(pattern: &str) -> PathBuf {
    let mut components: Vec<&str> = pattern.split('/').collect();
    // The last component names files, never the base directory.
    components.pop();

    components
        .into_iter()
        .take_while(|part| !part.contains(GLOB_META))
        .filter(|part| !part.is_empty() && *part != ".")
        .collect()
}

fn normalized(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
