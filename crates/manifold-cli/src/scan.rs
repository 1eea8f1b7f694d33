//! Multi-source scanning
//!
//! A repository usually holds several sources side by side: a chart here, an
//! overlay tree there, some plain manifests. [`scan`] walks the tree once and
//! hands each directory to the first driver that recognizes it. Everything
//! below a claimed directory belongs to that driver and is not probed again.

use anyhow::{Context, Result};
use manifold_core::File;
use manifold_source::paths::is_hidden_name;
use manifold_source::{select_source, Source, SourceError, SourceOptions};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<OsString, TrieNode>,
    end: bool,
}

/// Set of paths, stored by component
#[derive(Debug, Default)]
pub struct PathTrie {
    root: TrieNode,
}

impl PathTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &Path) {
        let mut current = &mut self.root;
        for component in path.components() {
            current = current
                .children
                .entry(component.as_os_str().to_os_string())
                .or_default();
        }
        current.end = true;
    }

    /// Whether `path` itself was inserted; prefixes do not count
    pub fn contains(&self, path: &Path) -> bool {
        let mut current = &self.root;
        for component in path.components() {
            match current.children.get(component.as_os_str()) {
                Some(next) => current = next,
                None => return false,
            }
        }
        current.end
    }
}

/// Resolve every source below `root`.
///
/// Paths no driver recognizes are skipped. A driver that recognizes a path
/// but fails to resolve it aborts the scan.
#[instrument(skip(options), fields(root = %root.display()), level = "debug")]
pub fn scan(root: &Path, options: &SourceOptions) -> Result<Vec<File>> {
    let mut claimed = PathTrie::new();
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_str().map(is_hidden_name).unwrap_or(false)
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let path = entry.path();

        if path.parent().is_some_and(|parent| claimed.contains(parent)) {
            claimed.insert(path);
            continue;
        }

        let driver = match select_source(path, options) {
            Ok(driver) => driver,
            Err(SourceError::NotRecognized(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        claimed.insert(path);
        let resolved = driver
            .resource_files()
            .with_context(|| format!("Failed to resolve {} source at {}", driver.kind(), path.display()))?;
        debug!("{} source at {} produced {} file(s)", driver.kind(), path.display(), resolved.len());
        files.extend(resolved);
    }

    info!("Scanned {} file(s) under {}", files.len(), root.display());
    Ok(files)
}
