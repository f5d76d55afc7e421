use std::collections::{BTreeSet, HashSet};

use crate::models::file_record::FileRecord;

/// How the catalog of one location relates to what is on disk right now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// On disk, not catalogued.
    pub created: BTreeSet<String>,
    /// Catalogued, no longer on disk.
    pub missing: Vec<FileRecord>,
    /// Catalogued and still on disk.
    pub existing: Vec<FileRecord>,
}

/// Partitions `disk_paths` and `records` by absolute path. Lookups go through
/// set indexes on both sides, never a scan of the other list.
pub fn diff(disk_paths: &BTreeSet<String>, records: Vec<FileRecord>) -> Reconciliation {
    let catalogued: HashSet<&str> = records.iter().map(|r| r.absolute_path.as_str()).collect();
    let created: BTreeSet<String> = disk_paths
        .iter()
        .filter(|path| !catalogued.contains(path.as_str()))
        .cloned()
        .collect();

    let (existing, missing): (Vec<FileRecord>, Vec<FileRecord>) = records
        .into_iter()
        .partition(|record| disk_paths.contains(&record.absolute_path));

    Reconciliation {
        created,
        missing,
        existing,
    }
}
