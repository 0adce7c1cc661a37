//! Job configuration: sample type, processing era, and conditions resolution.
//!
//! The era and sample type together determine the conditions tag and the era
//! string handed to the conversion engine. Both are closed enums so that an
//! unknown era is rejected while the job description is parsed, not when the
//! engine is already running.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of the input sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    /// Recorded collision data.
    Data,
    /// Simulated events.
    Mc,
}

impl SampleType {
    /// Returns the lowercase name used on command lines and in documents.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Mc => "mc",
        }
    }

    /// Returns the conversion-engine flag for this sample type.
    #[must_use]
    pub const fn engine_flag(&self) -> &'static str {
        match self {
            Self::Data => "--data",
            Self::Mc => "--mc",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "data" => Ok(Self::Data),
            "mc" => Ok(Self::Mc),
            other => Err(Error::configuration(format!(
                "unknown sample type {other:?} (expected \"data\" or \"mc\")"
            ))),
        }
    }
}

/// Data-taking era of the input sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
// Variant names are the canonical CMS era names.
#[allow(missing_docs, non_camel_case_types)]
pub enum Era {
    Run2_2016_HIPM,
    Run2_2016,
    Run2_2017,
    Run2_2018,
    Run3_2022,
    Run3_2022EE,
    Run3_2023,
    Run3_2023BPix,
}

impl Era {
    /// All known eras, in chronological order.
    pub const ALL: [Self; 8] = [
        Self::Run2_2016_HIPM,
        Self::Run2_2016,
        Self::Run2_2017,
        Self::Run2_2018,
        Self::Run3_2022,
        Self::Run3_2022EE,
        Self::Run3_2023,
        Self::Run3_2023BPix,
    ];

    /// Returns the canonical era name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Run2_2016_HIPM => "Run2_2016_HIPM",
            Self::Run2_2016 => "Run2_2016",
            Self::Run2_2017 => "Run2_2017",
            Self::Run2_2018 => "Run2_2018",
            Self::Run3_2022 => "Run3_2022",
            Self::Run3_2022EE => "Run3_2022EE",
            Self::Run3_2023 => "Run3_2023",
            Self::Run3_2023BPix => "Run3_2023BPix",
        }
    }

    /// Returns true for Run 2 eras.
    #[must_use]
    pub const fn is_run2(&self) -> bool {
        matches!(
            self,
            Self::Run2_2016_HIPM | Self::Run2_2016 | Self::Run2_2017 | Self::Run2_2018
        )
    }

    /// Returns the era argument handed to the conversion engine.
    ///
    /// Run 2 eras keep their full name; Run 3 eras collapse to a common
    /// `Run3` base. Both carry the matching nanoAOD era modifier.
    #[must_use]
    pub fn engine_argument(&self) -> String {
        if self.is_run2() {
            format!("{},run2_nanoAOD_106Xv2", self.as_str())
        } else {
            "Run3,run3_nanoAOD_124".to_string()
        }
    }

    /// Resolves the conditions tag for this era and sample type.
    ///
    /// # Errors
    /// Returns a configuration error for data eras that have no published
    /// data conditions entry.
    pub fn conditions(&self, sample_type: SampleType) -> Result<&'static str> {
        match sample_type {
            SampleType::Mc => Ok(match self {
                Self::Run2_2016_HIPM => "auto:run2_mc_pre_vfp",
                Self::Run2_2016 => "auto:run2_mc",
                Self::Run2_2017 => "auto:phase1_2017_realistic",
                Self::Run2_2018 => "auto:phase1_2018_realistic",
                Self::Run3_2022 => "auto:phase1_2022_realistic",
                Self::Run3_2022EE => "auto:phase1_2022_realistic_postEE",
                Self::Run3_2023 => "auto:phase1_2023_realistic",
                Self::Run3_2023BPix => "auto:phase1_2023_realistic_postBPix",
            }),
            SampleType::Data => match self {
                era if era.is_run2() => Ok("auto:run2_data"),
                Self::Run3_2022 | Self::Run3_2023 => Ok("auto:run3_data"),
                other => Err(Error::configuration(format!(
                    "no data conditions defined for era {}",
                    other.as_str()
                ))),
            },
        }
    }
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Era {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|era| era.as_str() == s)
            .ok_or_else(|| Error::configuration(format!("unknown era {s:?}")))
    }
}

/// Immutable configuration for one production job.
///
/// Built once from the job arguments and validated before the pipeline
/// starts; no stage mutates it.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Kind of the input sample.
    pub sample_type: SampleType,
    /// Data-taking era.
    pub era: Era,
    /// Event-count cap for the conversion engine (-1 processes everything).
    pub max_events: i64,
    /// Optional post-processing hook reference (`pkg/subpkg/module.function`).
    pub customisation_function: Option<String>,
    /// Optional raw customisation commands passed through to the engine.
    pub customisation_commands: Option<String>,
    /// Process each run of the input separately and merge afterwards.
    pub split_by_run: bool,
    /// Maximum number of concurrent per-run conversions.
    pub convert_jobs: usize,
    /// Directory where all intermediate artifacts are written.
    pub work_dir: PathBuf,
    /// Directory holding job-local helper scripts and hook sources.
    pub sandbox_dir: PathBuf,
    /// Root of the CMSSW installation, if available.
    pub cmssw_base: Option<PathBuf>,
}

impl JobConfig {
    /// Resolves the conditions tag for this job.
    ///
    /// # Errors
    /// Returns a configuration error if the era/sample combination has no
    /// conditions entry.
    pub fn conditions(&self) -> Result<&'static str> {
        self.era.conditions(self.sample_type)
    }

    /// Validates the configuration before the pipeline starts.
    ///
    /// # Errors
    /// Returns a configuration error on the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.convert_jobs == 0 {
            return Err(Error::configuration("convert_jobs must be at least 1"));
        }
        if self.max_events < -1 || self.max_events == 0 {
            return Err(Error::configuration(format!(
                "max_events must be -1 or positive, got {}",
                self.max_events
            )));
        }
        // Fail on unresolvable conditions now, not mid-pipeline.
        self.conditions().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_era_round_trips_through_names() {
        for era in Era::ALL {
            assert_eq!(era.as_str().parse::<Era>().unwrap(), era);
        }
        assert!("Run4_2030".parse::<Era>().is_err());
    }

    #[test]
    fn test_engine_argument_run2_keeps_full_name() {
        assert_eq!(
            Era::Run2_2016_HIPM.engine_argument(),
            "Run2_2016_HIPM,run2_nanoAOD_106Xv2"
        );
        assert_eq!(
            Era::Run2_2018.engine_argument(),
            "Run2_2018,run2_nanoAOD_106Xv2"
        );
    }

    #[test]
    fn test_engine_argument_run3_collapses() {
        for era in [
            Era::Run3_2022,
            Era::Run3_2022EE,
            Era::Run3_2023,
            Era::Run3_2023BPix,
        ] {
            assert_eq!(era.engine_argument(), "Run3,run3_nanoAOD_124");
        }
    }

    #[test]
    fn test_conditions_mc_table() {
        assert_eq!(
            Era::Run2_2016_HIPM.conditions(SampleType::Mc).unwrap(),
            "auto:run2_mc_pre_vfp"
        );
        assert_eq!(
            Era::Run3_2023BPix.conditions(SampleType::Mc).unwrap(),
            "auto:phase1_2023_realistic_postBPix"
        );
    }

    #[test]
    fn test_conditions_data() {
        assert_eq!(
            Era::Run2_2017.conditions(SampleType::Data).unwrap(),
            "auto:run2_data"
        );
        assert_eq!(
            Era::Run3_2022.conditions(SampleType::Data).unwrap(),
            "auto:run3_data"
        );
        assert!(Era::Run3_2022EE.conditions(SampleType::Data).is_err());
        assert!(Era::Run3_2023BPix.conditions(SampleType::Data).is_err());
    }

    #[test]
    fn test_sample_type_parsing() {
        assert_eq!("data".parse::<SampleType>().unwrap(), SampleType::Data);
        assert_eq!("mc".parse::<SampleType>().unwrap(), SampleType::Mc);
        assert!("embedded".parse::<SampleType>().is_err());
    }

    fn base_config() -> JobConfig {
        JobConfig {
            sample_type: SampleType::Mc,
            era: Era::Run3_2022,
            max_events: -1,
            customisation_function: None,
            customisation_commands: None,
            split_by_run: false,
            convert_jobs: 1,
            work_dir: PathBuf::from("."),
            sandbox_dir: PathBuf::from("."),
            cmssw_base: None,
        }
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = base_config();
        config.convert_jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_event_cap() {
        let mut config = base_config();
        config.max_events = 0;
        assert!(config.validate().is_err());
        config.max_events = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_catches_unresolvable_conditions() {
        let mut config = base_config();
        config.sample_type = SampleType::Data;
        config.era = Era::Run3_2022EE;
        assert!(config.validate().is_err());
    }
}
