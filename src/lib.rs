pub use calibration::{CalibrationCurve, SensitivityCalibration};
pub use config::ControllerConfig;
pub use controller::{Controller, RunState, TickReport};
pub use error::{Error, Result};
pub use estimator::{LaneStateEstimator, DEFAULT_EPSILON};
pub use lane::{LaneObservation, LaneSample, LaneState};
pub use model::{CaccParams, CaccTerms, CarFollowingModel, GmParams, SpeedCommand};
pub use network::TrafficNetwork;
pub use simulation::{Inflow, LaneAttributes, LaneSimulator, VehicleAttributes};
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use snapshot::{Leader, Snapshot};
pub use util::Interval;
pub use vehicle::VehicleKinematics;

mod calibration;
mod config;
mod controller;
mod error;
mod estimator;
mod lane;
pub mod math;
mod model;
mod network;
mod simulation;
mod snapshot;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a lane.
    pub struct LaneId;
    /// Unique ID of a vehicle.
    pub struct VehicleId;
}
