//! Output descriptors and skim configuration documents.
//!
//! A job declares its deliverables as semicolon-separated descriptor lines:
//!
//! ```text
//! file
//! file;pfn
//! file;pfn;skim_cfg;skim_setup
//! file;pfn;skim_cfg;skim_setup;skim_setup_failed
//! ```
//!
//! Exactly 1, 2, 4 or 5 fields are accepted; anything else is a fatal
//! configuration error. Skim setups are validated against their YAML
//! document before the pipeline runs any external engine.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Skim pass selection declared by an output descriptor.
///
/// The type couples the configuration document with the primary setup name,
/// so a setup can never be declared without a document or vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkimSelection {
    /// Path of the filter configuration document.
    pub config: PathBuf,
    /// Primary setup name within the document.
    pub setup: String,
    /// Fallback setup appended to the output when declared.
    pub fallback_setup: Option<String>,
}

/// One declared deliverable of the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    /// Destination file name, relative to the job working directory.
    pub file_name: String,
    /// Physical file name used by the outer wrapper for stage-out.
    pub pfn: Option<String>,
    /// Skim pass to apply; `None` copies the intermediate artifact verbatim.
    pub skim: Option<SkimSelection>,
}

impl OutputDescriptor {
    /// Parses one descriptor line.
    ///
    /// Empty fields are treated as absent, matching the line format where a
    /// trailing field may legitimately be blank.
    ///
    /// # Errors
    /// Returns `InvalidDescriptor` for a wrong field count, an empty file
    /// name, or an inconsistent skim declaration.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(';').collect();
        if !matches!(fields.len(), 1 | 2 | 4 | 5) {
            return Err(Error::invalid_descriptor(
                line,
                format!("expected 1, 2, 4 or 5 fields, got {}", fields.len()),
            ));
        }

        let field = |idx: usize| fields.get(idx).copied().filter(|f| !f.is_empty());

        let Some(file_name) = field(0) else {
            return Err(Error::invalid_descriptor(line, "empty output file name"));
        };
        let pfn = field(1).map(str::to_string);
        let skim_cfg = field(2);
        let skim_setup = field(3);
        let skim_setup_failed = field(4);

        let skim = match (skim_cfg, skim_setup) {
            (Some(config), Some(setup)) => Some(SkimSelection {
                config: PathBuf::from(config),
                setup: setup.to_string(),
                fallback_setup: skim_setup_failed.map(str::to_string),
            }),
            (None, None) => {
                if skim_setup_failed.is_some() {
                    return Err(Error::invalid_descriptor(
                        line,
                        "fallback setup declared without a primary setup",
                    ));
                }
                None
            }
            (Some(_), None) => {
                return Err(Error::invalid_descriptor(
                    line,
                    "skim configuration declared without a setup name",
                ));
            }
            (None, Some(_)) => {
                return Err(Error::invalid_descriptor(
                    line,
                    "skim setup declared without a configuration document",
                ));
            }
        };

        Ok(Self {
            file_name: file_name.to_string(),
            pfn,
            skim,
        })
    }

    /// Resolves the destination path against the job working directory.
    #[must_use]
    pub fn destination(&self, work_dir: &Path) -> PathBuf {
        let path = Path::new(&self.file_name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            work_dir.join(path)
        }
    }
}

/// A parsed filter configuration document: the set of setup names it defines.
///
/// The setup bodies are opaque to the pipeline; only the external filter
/// engine interprets them.
#[derive(Debug, Clone)]
pub struct SkimConfig {
    path: PathBuf,
    setups: BTreeSet<String>,
}

impl SkimConfig {
    /// Loads and parses a filter configuration document.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a YAML mapping.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let document: serde_yaml::Mapping =
            serde_yaml::from_str(&raw).map_err(Error::serialization)?;

        let setups = document
            .keys()
            .filter_map(serde_yaml::Value::as_str)
            .map(str::to_string)
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            setups,
        })
    }

    /// Returns true if the document defines the given setup.
    #[must_use]
    pub fn contains(&self, setup: &str) -> bool {
        self.setups.contains(setup)
    }

    /// Checks that a setup exists in the document.
    ///
    /// # Errors
    /// Returns `SetupNotFound` otherwise.
    pub fn require(&self, setup: &str) -> Result<()> {
        if self.contains(setup) {
            Ok(())
        } else {
            Err(Error::SetupNotFound {
                setup: setup.to_string(),
                document: self.path.display().to_string(),
            })
        }
    }
}

/// Validates every skim declaration against its configuration document.
///
/// Each distinct document is loaded once. This runs before any external
/// engine, so a bad setup name fails the job without side effects.
///
/// # Errors
/// Returns the first violation found, in declaration order.
pub fn validate_descriptors(descriptors: &[OutputDescriptor]) -> Result<()> {
    let mut documents: BTreeMap<PathBuf, SkimConfig> = BTreeMap::new();
    for descriptor in descriptors {
        let Some(skim) = &descriptor.skim else {
            continue;
        };
        let document = match documents.entry(skim.config.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(SkimConfig::load(&skim.config)?),
        };
        document.require(&skim.setup)?;
        if let Some(fallback) = &skim.fallback_setup {
            document.require(fallback)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_single_field() {
        let descriptor = OutputDescriptor::parse("nano.root").unwrap();
        assert_eq!(descriptor.file_name, "nano.root");
        assert!(descriptor.pfn.is_none());
        assert!(descriptor.skim.is_none());
    }

    #[test]
    fn test_parse_two_fields() {
        let descriptor = OutputDescriptor::parse("nano.root;store/nano.root").unwrap();
        assert_eq!(descriptor.pfn.as_deref(), Some("store/nano.root"));
        assert!(descriptor.skim.is_none());
    }

    #[test]
    fn test_parse_four_fields() {
        let descriptor = OutputDescriptor::parse("nano.root;pfn;skim.yaml;loose").unwrap();
        let skim = descriptor.skim.unwrap();
        assert_eq!(skim.config, PathBuf::from("skim.yaml"));
        assert_eq!(skim.setup, "loose");
        assert!(skim.fallback_setup.is_none());
    }

    #[test]
    fn test_parse_five_fields() {
        let descriptor = OutputDescriptor::parse("nano.root;pfn;skim.yaml;loose;backup").unwrap();
        let skim = descriptor.skim.unwrap();
        assert_eq!(skim.fallback_setup.as_deref(), Some("backup"));
    }

    #[test]
    fn test_parse_rejects_three_fields() {
        assert!(OutputDescriptor::parse("nano.root;pfn;skim.yaml").is_err());
    }

    #[test]
    fn test_parse_rejects_six_fields() {
        assert!(OutputDescriptor::parse("a;b;c;d;e;f").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_file_name() {
        assert!(OutputDescriptor::parse(";pfn").is_err());
    }

    #[test]
    fn test_parse_rejects_setup_without_config() {
        assert!(OutputDescriptor::parse("nano.root;pfn;;loose").is_err());
    }

    #[test]
    fn test_parse_rejects_config_without_setup() {
        assert!(OutputDescriptor::parse("nano.root;pfn;skim.yaml;").is_err());
    }

    #[test]
    fn test_parse_rejects_fallback_without_primary() {
        assert!(OutputDescriptor::parse("nano.root;pfn;;;backup").is_err());
    }

    #[test]
    fn test_destination_resolution() {
        let descriptor = OutputDescriptor::parse("nano.root").unwrap();
        assert_eq!(
            descriptor.destination(Path::new("/job")),
            PathBuf::from("/job/nano.root")
        );

        let absolute = OutputDescriptor::parse("/out/nano.root").unwrap();
        assert_eq!(
            absolute.destination(Path::new("/job")),
            PathBuf::from("/out/nano.root")
        );
    }

    fn write_skim_config(dir: &Path) -> PathBuf {
        let path = dir.join("skim.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "loose:\n  selection: \"pt > 10\"").unwrap();
        writeln!(file, "backup:\n  selection: \"pt > 5\"").unwrap();
        path
    }

    #[test]
    fn test_skim_config_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let config = SkimConfig::load(&write_skim_config(dir.path())).unwrap();
        assert!(config.contains("loose"));
        assert!(config.require("backup").is_ok());
        assert!(matches!(
            config.require("tight"),
            Err(Error::SetupNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_descriptors_accepts_known_setups() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_skim_config(dir.path());
        let line = format!("nano.root;pfn;{};loose;backup", config.display());
        let descriptors = vec![OutputDescriptor::parse(&line).unwrap()];
        assert!(validate_descriptors(&descriptors).is_ok());
    }

    #[test]
    fn test_validate_descriptors_rejects_unknown_primary() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_skim_config(dir.path());
        let line = format!("nano.root;pfn;{};tight", config.display());
        let descriptors = vec![OutputDescriptor::parse(&line).unwrap()];
        assert!(matches!(
            validate_descriptors(&descriptors),
            Err(Error::SetupNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_descriptors_rejects_unknown_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_skim_config(dir.path());
        let line = format!("nano.root;pfn;{};loose;tight", config.display());
        let descriptors = vec![OutputDescriptor::parse(&line).unwrap()];
        assert!(matches!(
            validate_descriptors(&descriptors),
            Err(Error::SetupNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_descriptors_reports_missing_document() {
        let descriptors = vec![OutputDescriptor::parse("n.root;p;/no/such.yaml;loose").unwrap()];
        assert!(validate_descriptors(&descriptors).is_err());
    }
}
