use crate::estimator::DEFAULT_EPSILON;
use crate::model::CarFollowingModel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default leader sensing distance in m.
pub const DEFAULT_SENSING_HORIZON: f64 = 300.0;

/// The configuration of a [Controller](crate::Controller).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// The tick length in s.
    pub dt: f64,
    /// How far ahead a vehicle looks for its leader, in m.
    pub sensing_horizon: f64,
    /// The finite-difference guard of the lane state estimator.
    pub epsilon: f64,
    /// The number of samples of lane history to retain, zero to disable.
    pub history: usize,
    /// Use this sensitivity for every lane instead of the estimated one.
    pub fixed_sensitivity: Option<f64>,
    /// Log a lane summary every this many ticks, zero to disable.
    pub report_interval: usize,
    /// A JSON calibration store to load when the controller starts.
    pub calibration: Option<PathBuf>,
    /// The car following model.
    pub model: CarFollowingModel,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dt: 1.0,
            sensing_horizon: DEFAULT_SENSING_HORIZON,
            epsilon: DEFAULT_EPSILON,
            history: 0,
            fixed_sensitivity: None,
            report_interval: 10,
            calibration: None,
            model: CarFollowingModel::default(),
        }
    }
}

impl ControllerConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every parameter is in range.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(Error::Config(format!("`{}` must be positive, got {}", name, value)))
            }
        }

        positive("dt", self.dt)?;
        positive("sensing_horizon", self.sensing_horizon)?;
        positive("epsilon", self.epsilon)?;
        if let Some(alpha) = self.fixed_sensitivity {
            if !alpha.is_finite() {
                return Err(Error::Config("`fixed_sensitivity` must be finite".into()));
            }
        }
        match self.model {
            CarFollowingModel::Gm(params) => positive("gap_floor", params.gap_floor)?,
            CarFollowingModel::Cacc(params) => {
                if !(0.0..=1.0).contains(&params.cooperation) {
                    return Err(Error::Config(format!(
                        "`cooperation` must lie in [0, 1], got {}",
                        params.cooperation
                    )));
                }
                positive("decel_weight", params.decel_weight)?;
            }
        }
        Ok(())
    }
}
