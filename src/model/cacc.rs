use crate::math::{guard, heaviside};
use crate::vehicle::VehicleKinematics;
use crate::Result;
use log::trace;
use serde::{Deserialize, Serialize};

/// Guards every division in the model.
pub const EPSILON: f64 = 1e-6;

/// The free road acceleration exponent.
const FREE_EXPONENT: i32 = 4;

/// The spacing saturation exponent.
const SPACING_EXPONENT: i32 = 8;

/// The parameters of the blended collision avoidance model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaccParams {
    /// How far the collision avoidance heuristic may soften the spacing term,
    /// from 0 (pure spacing-based following) to 1.
    pub cooperation: f64,
    /// Scales the closing-speed penalty of the collision avoidance heuristic.
    pub decel_weight: f64,
}

impl Default for CaccParams {
    fn default() -> Self {
        Self {
            cooperation: 0.0,
            decel_weight: 1.0,
        }
    }
}

/// The intermediate quantities of one evaluation of the model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaccTerms {
    /// The gap to the leader in m.
    pub gap: f64,
    /// The leader's acceleration, capped at the follower's maximum.
    pub a_bar: f64,
    /// The collision avoidance heuristic acceleration.
    pub a_cah: f64,
    /// The desired dynamic gap in m.
    pub gap_desired: f64,
    /// The free road acceleration.
    pub a_free: f64,
    /// The ratio of desired to actual gap.
    pub z: f64,
    /// The spacing-based acceleration.
    pub a_iidm: f64,
    /// The final acceleration, after blending and clamping.
    pub a_cacc: f64,
}

impl CaccParams {
    /// Evaluates the model and returns every intermediate term.
    ///
    /// Fails if the leader's realised acceleration is unknown.
    pub fn terms(
        &self,
        follower: &VehicleKinematics,
        leader: &VehicleKinematics,
        dt: f64,
    ) -> Result<CaccTerms> {
        let a_lead = leader.require_measured_accel()?;
        let gap = follower.gap_to(leader);
        let (v, v_l) = (follower.speed, leader.speed);
        let (max_acc, max_dec) = (follower.max_accel, follower.max_decel);

        let a_bar = f64::min(a_lead, max_acc);

        let a_cah = if v_l > 0.0 {
            if v_l * (v - v_l) > -2.0 * gap * a_bar {
                let theta = heaviside(v - v_l);
                a_bar - theta * (v - v_l).powi(2) / guard(2.0 * self.decel_weight * gap, EPSILON)
            } else {
                v.powi(2) * a_bar / guard(v_l.powi(2) - 2.0 * gap * a_bar, EPSILON)
            }
        } else {
            0.0
        };

        let brake = guard(2.0 * (max_acc * max_dec).sqrt(), EPSILON);
        let dynamic = v * follower.reaction_time + v * (v - v_l) / brake;
        let gap_desired = follower.min_gap + f64::max(0.0, dynamic);

        let a_free = max_acc * (1.0 - (v / (follower.max_speed + EPSILON)).powi(FREE_EXPONENT));

        // Overlapping vehicles have an effectively infinite spacing ratio.
        let z = gap_desired / f64::max(gap, EPSILON);
        let a_iidm = if z >= 1.0 {
            max_acc * (1.0 - z.powi(SPACING_EXPONENT))
        } else if a_free > 0.0 {
            let exponent = SPACING_EXPONENT as f64 * max_acc / (a_free + EPSILON);
            a_free * (1.0 - z.powf(exponent))
        } else {
            a_free
        };

        let c = self.cooperation;
        let mut a_cacc = if c <= 0.0 || a_iidm >= a_cah {
            a_iidm
        } else {
            let b = guard(max_dec, EPSILON);
            (1.0 - c) * a_iidm + c * (a_cah + b * ((a_iidm - a_cah) / b).tanh())
        };
        if gap <= follower.min_gap {
            a_cacc = f64::min(a_cacc, (v_l - v) / guard(dt, EPSILON));
        }

        Ok(CaccTerms {
            gap,
            a_bar,
            a_cah,
            gap_desired,
            a_free,
            z,
            a_iidm,
            a_cacc,
        })
    }

    /// Computes the follower's speed after one tick of `dt` seconds.
    ///
    /// Negative results are clamped to zero; the model never requests reversing.
    pub fn speed(
        &self,
        follower: &VehicleKinematics,
        leader: &VehicleKinematics,
        dt: f64,
    ) -> Result<f64> {
        let terms = self.terms(follower, leader, dt)?;
        let speed = follower.speed + terms.a_cacc * dt;
        if speed < 0.0 {
            trace!(
                "{:?}: clamped speed {:.3} to zero (gap {:.2}, a_cacc {:.2})",
                follower.id,
                speed,
                terms.gap,
                terms.a_cacc
            );
        }
        Ok(f64::max(speed, 0.0))
    }
}
