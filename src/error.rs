use crate::{LaneId, VehicleId};
use thiserror::Error;

/// Errors raised by the controller and its collaborators.
///
/// Numerical edge cases (zero gaps, stopped leaders, unchanged densities) are never errors;
/// everything here means the engine cannot proceed with a consistent state.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Lane {0:?} was not enumerated when the estimator was built")]
    UnknownLane(LaneId),
    #[error("Vehicle {0:?} is not part of the current tick")]
    UnknownVehicle(VehicleId),
    #[error("Vehicle {vehicle:?} is missing required attribute `{attribute}`")]
    MissingAttribute {
        vehicle: VehicleId,
        attribute: &'static str,
    },
    #[error("Vehicle {vehicle:?} has invalid `{attribute}` = {value}")]
    InvalidAttribute {
        vehicle: VehicleId,
        attribute: &'static str,
        value: f64,
    },
    #[error("Lane {lane:?} reported invalid observation (speed {mean_speed}, density {density})")]
    InvalidObservation {
        lane: LaneId,
        mean_speed: f64,
        density: f64,
    },
    #[error("Lane {lane:?} was already updated with a different observation in frame {frame}")]
    LaneAlreadyUpdated { lane: LaneId, frame: usize },
    #[error("Computed a non-finite speed for vehicle {vehicle:?}")]
    NonFiniteCommand { vehicle: VehicleId },
    #[error("Controller is not running")]
    NotRunning,
    #[error("Controller has already been started")]
    AlreadyStarted,
    #[error("Calibration refers to unknown lane `{0}`")]
    UnknownCalibrationLane(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
