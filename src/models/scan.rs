use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTreeItem {
    pub name: String,
    pub full_path: String,
    pub children: Vec<DirectoryTreeItem>,
}

/// Everything found under a location root at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub root: String,
    pub paths: BTreeSet<String>,
    pub tree: Vec<DirectoryTreeItem>,
    /// Subtrees that could not be read and were left out.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(ScanResult),
    /// The root itself could not be read.
    Unreachable { root: String, reason: String },
}
