use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::scan::{DirectoryTreeItem, ScanOutcome, ScanResult};
use crate::path_scope;

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_supported(path: &Path, extensions: &[String]) -> bool {
    path_scope::extension_lowercase(path)
        .map(|ext| extensions.iter().any(|e| *e == ext))
        .unwrap_or(false)
}

fn insert_directory(tree: &mut Vec<DirectoryTreeItem>, root: &Path, dir: &Path) {
    let Ok(relative) = dir.strip_prefix(root) else {
        return;
    };

    let mut level = tree;
    let mut current = root.to_path_buf();
    for component in relative.components() {
        let name = component.as_os_str().to_string_lossy().to_string();
        current.push(&name);
        let pos = match level.iter().position(|item| item.name == name) {
            Some(pos) => pos,
            None => {
                level.push(DirectoryTreeItem {
                    name,
                    full_path: current.to_string_lossy().to_string(),
                    children: Vec::new(),
                });
                level.len() - 1
            }
        };
        level = &mut level[pos].children;
    }
}

/// Walks `root` and collects every supported image below it, plus the
/// directory hierarchy. Unreadable subtrees are logged and skipped; an
/// unreadable root yields [`ScanOutcome::Unreachable`].
pub fn scan_location(root: &str, extensions: &[String]) -> ScanOutcome {
    let root_path = Path::new(root);
    if let Err(e) = fs::read_dir(root_path) {
        return ScanOutcome::Unreachable {
            root: root.to_string(),
            reason: e.to_string(),
        };
    }

    let mut result = ScanResult {
        root: root.to_string(),
        ..ScanResult::default()
    };

    let walker = walkdir::WalkDir::new(root_path)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root, error = %e, "skipping unreadable path during scan");
                result.skipped += 1;
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_dir() {
            insert_directory(&mut result.tree, root_path, path);
        } else if entry.file_type().is_file() && is_supported(path, extensions) {
            result.paths.insert(path.to_string_lossy().to_string());
        }
    }

    debug!(
        root = %root,
        files = result.paths.len(),
        skipped = result.skipped,
        "scan finished"
    );
    ScanOutcome::Found(result)
}

pub async fn scan_location_async(
    root: String,
    extensions: Vec<String>,
) -> Result<ScanOutcome, AppError> {
    tokio::task::spawn_blocking(move || scan_location(&root, &extensions))
        .await
        .map_err(|e| AppError::General(format!("scan task failed: {e}")))
}
