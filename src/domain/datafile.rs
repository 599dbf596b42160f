//! Experiment datafile model
//!
//! A datafile is a JSON document listing every flag with its variations:
//!
//! ```json
//! {
//!   "revision": "7",
//!   "flags": [
//!     {
//!       "key": "product_sort",
//!       "variations": [
//!         { "name": "price", "weight": 50, "variables": { "sort_method": "sort_by_price" } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::domain::types::{ExperimentConfig, Variation};
use crate::error::{Result, SorterError};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FlagDefinition {
    pub key: String,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Datafile {
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub flags: Vec<FlagDefinition>,
}

impl Datafile {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Extract one flag as an experiment snapshot
    pub fn experiment(&self, flag_key: &str) -> Result<ExperimentConfig> {
        let flag = self.flags.iter().find(|f| f.key == flag_key).ok_or_else(|| {
            SorterError::configuration(
                flag_key,
                None,
                format!("flag not found in datafile revision '{}'", self.revision),
            )
        })?;

        Ok(ExperimentConfig {
            key: flag.key.clone(),
            revision: self.revision.clone(),
            variations: flag.variations.clone(),
        })
    }
}
