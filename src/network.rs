use crate::lane::LaneObservation;
use crate::model::SpeedCommand;
use crate::vehicle::VehicleKinematics;
use crate::{LaneId, Result, VehicleId};

/// The traffic simulator the controller drives.
///
/// The network owns the true vehicle physics and lane geometry. The controller only reads
/// from it at the start of a tick, writes speed commands at the end, then asks it to advance.
pub trait TrafficNetwork {
    /// The lanes in the network. Queried once, when the controller starts.
    fn lanes(&self) -> Vec<LaneId>;

    /// The name of a lane, used to bind calibration curves.
    fn lane_name(&self, lane_id: LaneId) -> Result<&str>;

    /// The length of a lane in m.
    fn lane_length(&self, lane_id: LaneId) -> Result<f64>;

    /// The current mean speed, density and vehicles of a lane.
    fn observe_lane(&self, lane_id: LaneId) -> Result<LaneObservation>;

    /// The vehicles currently in the network.
    fn vehicles(&self) -> Vec<VehicleId>;

    /// The current attributes and motion of a vehicle.
    fn vehicle(&self, vehicle_id: VehicleId) -> Result<VehicleKinematics>;

    /// The nearest vehicle ahead of `vehicle_id` within `horizon` m, if any.
    fn leader(&self, vehicle_id: VehicleId, horizon: f64) -> Result<Option<VehicleId>>;

    /// Sets the speed of a vehicle for the next tick.
    fn command_speed(&mut self, vehicle_id: VehicleId, command: SpeedCommand) -> Result<()>;

    /// Advances the network by one tick. Returns `false` once the simulation has ended.
    fn advance(&mut self) -> Result<bool>;
}
