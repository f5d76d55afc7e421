use tracing::debug;

use crate::models::file_record::{FileRecord, ProbedFile};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameMatches {
    /// Every missing record, paired with the new file it moved to, if any.
    pub pairs: Vec<(FileRecord, Option<ProbedFile>)>,
    /// Created files no missing record claimed; these become new records.
    pub unmatched_created: Vec<ProbedFile>,
}

#[cfg(test)]
impl RenameMatches {
    pub fn renamed(&self) -> impl Iterator<Item = (&FileRecord, &ProbedFile)> {
        self.pairs
            .iter()
            .filter_map(|(record, found)| found.as_ref().map(|f| (record, f)))
    }

    pub fn still_missing(&self) -> impl Iterator<Item = &FileRecord> {
        self.pairs
            .iter()
            .filter(|(_, found)| found.is_none())
            .map(|(record, _)| record)
    }
}

/// Pairs each missing record with the first created file that has the same
/// width, height and byte size. A created file is claimed at most once.
///
/// This is a coarse heuristic: two different images that share all three
/// values are indistinguishable here and may be paired.
pub fn match_renames(missing: Vec<FileRecord>, created: Vec<ProbedFile>) -> RenameMatches {
    let mut pool = created;
    let mut pairs = Vec::with_capacity(missing.len());

    for record in missing {
        let found = pool
            .iter()
            .position(|candidate| record.has_same_characteristics(&candidate.metadata))
            .map(|pos| pool.remove(pos));
        if let Some(found) = &found {
            debug!(from = %record.absolute_path, to = %found.path, "matched moved file");
        }
        pairs.push((record, found));
    }

    RenameMatches {
        pairs,
        unmatched_created: pool,
    }
}
