//! Partition index builder.
//!
//! Given one input file, builds the mapping from run number to the selector
//! file covering exactly that run's lumi blocks. Partition metadata
//! extraction is an external capability behind [`RunLumiSource`]; the
//! shipped [`RunLumiIndex`] consumes the dataset document the production
//! tooling materializes up front (`{ "<file>": { "<run>": [lumi, ...] } }`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nanoprod_core::lumi::{selector_file_name, LumiBlock, LumiMask, RunNumber};

use crate::error::{Error, Result};

/// Mapping of run number to its selector file, ascending by run.
pub type PartitionIndex = BTreeMap<RunNumber, PathBuf>;

/// Source of (run, lumi) pairs for an input file.
pub trait RunLumiSource: Send + Sync {
    /// Returns the (run, lumi) pairs contained in `input`.
    ///
    /// # Errors
    /// Returns `MetadataRead` if the metadata cannot be extracted.
    fn run_lumis(&self, input: &Path) -> Result<Vec<(RunNumber, LumiBlock)>>;
}

/// Dataset run/lumi index loaded from a JSON document.
///
/// The document maps each dataset file to its runs and lumi blocks. Lookups
/// try the exact input path first and fall back to matching by file name,
/// since grid jobs frequently address the same file through different
/// prefixes.
#[derive(Debug, Clone)]
pub struct RunLumiIndex {
    path: PathBuf,
    files: BTreeMap<String, BTreeMap<RunNumber, Vec<LumiBlock>>>,
}

impl RunLumiIndex {
    /// Loads the index document from `path`.
    ///
    /// # Errors
    /// Returns `MetadataRead` if the document cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| Error::metadata_read(path, err.to_string()))?;
        let document: BTreeMap<String, BTreeMap<String, Vec<LumiBlock>>> =
            serde_json::from_str(&raw)
                .map_err(|err| Error::metadata_read(path, err.to_string()))?;

        let mut files = BTreeMap::new();
        for (file, runs) in document {
            let mut parsed = BTreeMap::new();
            for (run, lumis) in runs {
                let run: RunNumber = run.parse().map_err(|_| {
                    Error::metadata_read(path, format!("invalid run number {run:?} for {file}"))
                })?;
                parsed.insert(run, lumis);
            }
            files.insert(file, parsed);
        }
        Ok(Self {
            path: path.to_path_buf(),
            files,
        })
    }

    fn lookup(&self, input: &Path) -> Option<&BTreeMap<RunNumber, Vec<LumiBlock>>> {
        let key = input.to_string_lossy();
        if let Some(runs) = self.files.get(key.as_ref()) {
            return Some(runs);
        }
        let name = input.file_name()?.to_string_lossy();
        self.files
            .iter()
            .find(|(file, _)| {
                Path::new(file)
                    .file_name()
                    .is_some_and(|candidate| candidate.to_string_lossy() == name)
            })
            .map(|(_, runs)| runs)
    }
}

impl RunLumiSource for RunLumiIndex {
    fn run_lumis(&self, input: &Path) -> Result<Vec<(RunNumber, LumiBlock)>> {
        let runs = self.lookup(input).ok_or_else(|| {
            Error::metadata_read(
                input,
                format!("file not listed in run/lumi index {}", self.path.display()),
            )
        })?;
        Ok(runs
            .iter()
            .flat_map(|(run, lumis)| lumis.iter().map(|lumi| (*run, *lumi)))
            .collect())
    }
}

/// Builds the partition index for `input`, writing one selector file per run.
///
/// Selector files land in `dir` under the deterministic name
/// `{base}_{run}.json`; re-running with the same input rewrites the same
/// files with the same contents.
///
/// # Errors
/// Returns `MetadataRead` if the source fails, or an IO error if a selector
/// cannot be written.
pub fn build_partition_index(
    source: &dyn RunLumiSource,
    input: &Path,
    dir: &Path,
    base: &str,
) -> Result<PartitionIndex> {
    let mask: LumiMask = source.run_lumis(input)?.into_iter().collect();
    tracing::debug!(
        input = %input.display(),
        runs = mask.len(),
        "building partition index"
    );

    let mut index = PartitionIndex::new();
    for run in mask.runs() {
        let selector = dir.join(selector_file_name(base, run));
        mask.select_run(run).write(&selector).map_err(Error::Config)?;
        index.insert(run, selector);
    }
    Ok(index)
}
