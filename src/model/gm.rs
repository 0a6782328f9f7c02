use crate::vehicle::VehicleKinematics;
use serde::{Deserialize, Serialize};

/// The smallest gap the model divides by, in m.
pub const DEFAULT_GAP_FLOOR: f64 = 0.1;

/// The parameters of the General Motors car following model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmParams {
    /// Gaps below this, including overlaps, are raised to it before dividing, in m.
    pub gap_floor: f64,
}

impl Default for GmParams {
    fn default() -> Self {
        Self {
            gap_floor: DEFAULT_GAP_FLOOR,
        }
    }
}

impl GmParams {
    /// Computes the follower's acceleration in m/s<sup>2</sup>.
    ///
    /// A closing follower at a tiny gap brakes very hard; that is the intended response.
    pub fn acceleration(
        &self,
        follower: &VehicleKinematics,
        leader: &VehicleKinematics,
        alpha: f64,
    ) -> f64 {
        let gap = f64::max(follower.gap_to(leader), self.gap_floor);
        let acc = alpha * (leader.speed - follower.speed) / gap;
        f64::min(acc, follower.max_accel)
    }

    /// Computes the follower's speed after one tick of `dt` seconds. Never negative.
    pub fn speed(
        &self,
        follower: &VehicleKinematics,
        leader: &VehicleKinematics,
        alpha: f64,
        dt: f64,
    ) -> f64 {
        let acc = self.acceleration(follower, leader, alpha);
        f64::max(follower.speed + acc * dt, 0.0)
    }
}
