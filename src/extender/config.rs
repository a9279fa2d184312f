use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::xdrop::ExtensionParams;
use crate::errors::{ConfigurationError, ExtenderError};
use crate::scoring::{EntropyPolicy, ScoreTable, ShannonEntropy};

fn default_xdrop_threshold() -> i32 {
    ExtenderConfig::DEFAULT_XDROP_THRESHOLD
}

fn default_saturation_bits() -> f64 {
    ShannonEntropy::DEFAULT_SATURATION_BITS
}

/// Scoring configuration of an extender.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtenderConfig {
    #[serde(default)]
    pub score_table: ScoreTable,

    #[serde(default = "default_xdrop_threshold")]
    pub xdrop_threshold: i32,

    /// Use raw substitution scores instead of entropy adjusted ones
    #[serde(default)]
    pub no_entropy_adjustment: bool,

    /// Entropy (in bits) at which a region counts as fully complex
    #[serde(default = "default_saturation_bits")]
    pub entropy_saturation_bits: f64,
}

impl ExtenderConfig {
    pub const DEFAULT_XDROP_THRESHOLD: i32 = 910;

    pub fn new(score_table: ScoreTable, xdrop_threshold: i32, no_entropy_adjustment: bool) -> Self {
        Self {
            score_table,
            xdrop_threshold,
            no_entropy_adjustment,
            entropy_saturation_bits: ShannonEntropy::DEFAULT_SATURATION_BITS,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ExtenderError> {
        let reader = File::open(path).map(BufReader::new)?;
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExtenderError> {
        if self.xdrop_threshold <= 0 {
            return Err(ConfigurationError::XDropThreshold(self.xdrop_threshold).into());
        }

        if !self.no_entropy_adjustment {
            ShannonEntropy::new(self.entropy_saturation_bits)?;
        }

        Ok(())
    }

    fn entropy_policy(&self) -> Result<Option<Arc<dyn EntropyPolicy>>, ExtenderError> {
        if self.no_entropy_adjustment {
            return Ok(None);
        }

        let policy = ShannonEntropy::new(self.entropy_saturation_bits)?;
        Ok(Some(Arc::new(policy)))
    }

    pub(crate) fn to_params(&self) -> Result<ExtensionParams, ExtenderError> {
        self.validate()?;

        Ok(ExtensionParams {
            score_table: self.score_table.clone(),
            xdrop_threshold: self.xdrop_threshold,
            entropy_policy: self.entropy_policy()?,
        })
    }
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        Self::new(ScoreTable::default(), Self::DEFAULT_XDROP_THRESHOLD, false)
    }
}
