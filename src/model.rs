pub use self::cacc::{CaccParams, CaccTerms};
pub use self::gm::GmParams;
use crate::vehicle::VehicleKinematics;
use crate::Result;
use serde::{Deserialize, Serialize};

mod cacc;
mod gm;

/// The speed a vehicle is told to travel at for the next tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpeedCommand {
    /// Travel at this speed, in m/s.
    Target(f64),
    /// Nothing to follow; the network governs the vehicle's speed up to its allowed maximum.
    FreeFlow,
}

impl SpeedCommand {
    /// The commanded speed in m/s, resolving [FreeFlow](Self::FreeFlow)
    /// to the follower's allowed maximum speed.
    pub fn speed(&self, follower: &VehicleKinematics) -> f64 {
        match self {
            Self::Target(speed) => *speed,
            Self::FreeFlow => follower.max_speed,
        }
    }
}

/// A car following model, chosen once when the controller is configured.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CarFollowingModel {
    /// The General Motors model, reacting to relative speed scaled by the lane sensitivity.
    Gm(GmParams),
    /// Collision avoidance blended with smooth spacing-based following.
    Cacc(CaccParams),
}

impl Default for CarFollowingModel {
    fn default() -> Self {
        Self::Gm(Default::default())
    }
}

impl CarFollowingModel {
    /// Computes the speed command for a vehicle for the next tick.
    ///
    /// # Parameters
    /// * `follower` - The controlled vehicle
    /// * `leader` - The nearest vehicle ahead, if there is one within sensing range
    /// * `alpha` - The sensitivity coefficient of the follower's lane
    /// * `dt` - The tick length in s
    pub fn compute(
        &self,
        follower: &VehicleKinematics,
        leader: Option<&VehicleKinematics>,
        alpha: f64,
        dt: f64,
    ) -> Result<SpeedCommand> {
        let leader = match leader {
            Some(leader) => leader,
            None => return Ok(SpeedCommand::FreeFlow),
        };
        let speed = match self {
            Self::Gm(params) => params.speed(follower, leader, alpha, dt),
            Self::Cacc(params) => params.speed(follower, leader, dt)?,
        };
        Ok(SpeedCommand::Target(speed))
    }

    /// A short name for log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gm(_) => "gm",
            Self::Cacc(_) => "cacc",
        }
    }
}
