//! Run and luminosity-block types with deterministic mask encoding.
//!
//! A lumi mask restricts an external engine to a named subset of events.
//! The on-disk form is the CMS-style JSON document
//! `{"<run>": [[first, last], ...]}` with runs as sorted string keys and
//! lumi blocks compacted into inclusive ranges.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Run number identifying one data-taking run (the partition key).
pub type RunNumber = u32;

/// Luminosity-block number within a run (the sub-unit identifier).
pub type LumiBlock = u32;

/// Sorted, compacted list of inclusive `[first, last]` lumi ranges.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LumiRanges(Vec<(LumiBlock, LumiBlock)>);

impl LumiRanges {
    /// Builds compacted ranges from an arbitrary sequence of lumi blocks.
    ///
    /// Duplicates collapse; adjacent blocks fuse into one range. The result
    /// is deterministic regardless of the input order.
    #[must_use]
    pub fn from_blocks(blocks: impl IntoIterator<Item = LumiBlock>) -> Self {
        let mut blocks: Vec<LumiBlock> = blocks.into_iter().collect();
        blocks.sort_unstable();
        blocks.dedup();

        let mut ranges: Vec<(LumiBlock, LumiBlock)> = Vec::new();
        for block in blocks {
            match ranges.last_mut() {
                Some((_, last)) if *last + 1 == block => *last = block,
                _ => ranges.push((block, block)),
            }
        }
        Self(ranges)
    }

    /// Returns the ranges as `(first, last)` pairs.
    #[must_use]
    pub fn as_slice(&self) -> &[(LumiBlock, LumiBlock)] {
        &self.0
    }

    /// Returns the number of lumi blocks covered.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.0
            .iter()
            .map(|(first, last)| u64::from(last - first) + 1)
            .sum()
    }
}

/// Mapping of run number to the lumi ranges selected for that run.
///
/// `BTreeMap` keeps runs in ascending order, so iteration and serialization
/// are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LumiMask(BTreeMap<RunNumber, LumiRanges>);

impl LumiMask {
    /// Creates an empty mask.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the runs present in the mask, ascending.
    pub fn runs(&self) -> impl Iterator<Item = RunNumber> + '_ {
        self.0.keys().copied()
    }

    /// Returns the number of runs in the mask.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the mask selects nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the ranges for one run, if present.
    #[must_use]
    pub fn get(&self, run: RunNumber) -> Option<&LumiRanges> {
        self.0.get(&run)
    }

    /// Returns a mask restricted to a single run.
    #[must_use]
    pub fn select_run(&self, run: RunNumber) -> Self {
        let mut selected = BTreeMap::new();
        if let Some(ranges) = self.0.get(&run) {
            selected.insert(run, ranges.clone());
        }
        Self(selected)
    }

    /// Serializes the mask to its JSON document form.
    ///
    /// # Errors
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::serialization)
    }

    /// Writes the mask to `path` as a JSON document.
    ///
    /// # Errors
    /// Returns an error if encoding or the write fails.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl FromIterator<(RunNumber, LumiBlock)> for LumiMask {
    fn from_iter<I: IntoIterator<Item = (RunNumber, LumiBlock)>>(pairs: I) -> Self {
        let mut grouped: BTreeMap<RunNumber, Vec<LumiBlock>> = BTreeMap::new();
        for (run, lumi) in pairs {
            grouped.entry(run).or_default().push(lumi);
        }
        Self(
            grouped
                .into_iter()
                .map(|(run, blocks)| (run, LumiRanges::from_blocks(blocks)))
                .collect(),
        )
    }
}

/// Returns the deterministic selector file name for one run.
///
/// Same base and run always produce the same name, which makes re-runs
/// idempotent.
#[must_use]
pub fn selector_file_name(base: &str, run: RunNumber) -> PathBuf {
    PathBuf::from(format!("{base}_{run}.json"))
}
