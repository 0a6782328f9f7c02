use crate::math::guard;
use crate::{LaneId, VehicleId};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// What the network reports about one lane for one tick.
#[derive(Clone, Debug, Default)]
pub struct LaneObservation {
    /// The mean speed of vehicles on the lane in m/s.
    pub mean_speed: f64,
    /// The lane density, as an occupancy fraction.
    pub density: f64,
    /// The vehicles on the lane this tick.
    pub vehicles: Vec<VehicleId>,
}

/// A single (speed, density, flow) point in a lane's history.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneSample {
    pub mean_speed: f64,
    pub density: f64,
    pub flow: f64,
}

/// The macroscopic traffic state of a single lane.
#[derive(Clone, Debug)]
pub struct LaneState {
    /// The lane ID.
    id: LaneId,
    /// The lane's name in the network.
    name: String,
    /// The length of the lane in m.
    length: f64,
    /// The latest mean speed in m/s.
    mean_speed: f64,
    /// The latest density.
    density: f64,
    /// The sensitivity coefficient in s<sup>-1</sup>.
    sensitivity: f64,
    /// The (mean speed, density) of the previous tick, once there is one.
    prev: Option<(f64, f64)>,
    /// The estimator frame the current sample belongs to.
    frame: Option<usize>,
    /// The vehicles on the lane in the current tick.
    present: HashSet<VehicleId>,
    /// The vehicles on the lane in the previous tick.
    prev_present: HashSet<VehicleId>,
    /// The number of vehicles that entered the lane this tick.
    arrivals: usize,
    /// Recent samples, oldest first.
    history: VecDeque<LaneSample>,
    /// The maximum number of samples kept in `history`.
    history_cap: usize,
}

impl LaneState {
    /// Creates the state of a lane that has not been observed yet.
    pub(crate) fn new(id: LaneId, name: &str, length: f64, history_cap: usize) -> Self {
        Self {
            id,
            name: name.to_owned(),
            length,
            mean_speed: 0.0,
            density: 0.0,
            sensitivity: 0.0,
            prev: None,
            frame: None,
            present: HashSet::new(),
            prev_present: HashSet::new(),
            arrivals: 0,
            history: VecDeque::with_capacity(history_cap),
            history_cap,
        }
    }

    /// Gets the lane's ID.
    pub fn id(&self) -> LaneId {
        self.id
    }

    /// The lane's name in the network.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The latest mean speed in m/s.
    pub fn mean_speed(&self) -> f64 {
        self.mean_speed
    }

    /// The latest density.
    pub fn density(&self) -> f64 {
        self.density
    }

    /// The flow, always derived from the latest density and mean speed.
    pub fn flow(&self) -> f64 {
        self.density * self.mean_speed
    }

    /// The estimator frame of the latest sample, once the lane has been observed.
    pub fn frame(&self) -> Option<usize> {
        self.frame
    }

    /// The latest sensitivity coefficient.
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// The number of vehicles that entered the lane since the previous tick.
    pub fn arrivals(&self) -> usize {
        self.arrivals
    }

    /// The latest sample.
    pub fn sample(&self) -> LaneSample {
        LaneSample {
            mean_speed: self.mean_speed,
            density: self.density,
            flow: self.flow(),
        }
    }

    /// The retained samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &LaneSample> + '_ {
        self.history.iter()
    }

    /// The retained history as (density, mean speed, flow) points.
    pub fn fundamental_diagram(&self) -> Vec<(f64, f64, f64)> {
        self.history
            .iter()
            .map(|s| (s.density, s.mean_speed, s.flow))
            .collect()
    }

    /// Records an observation taken in estimator frame `frame`.
    ///
    /// Repeating an observation within the same frame replaces the current sample
    /// rather than shifting it into `prev`.
    pub(crate) fn observe(&mut self, frame: usize, obs: &LaneObservation) {
        let new_frame = self.frame != Some(frame);
        if new_frame {
            if self.frame.is_some() {
                self.prev = Some((self.mean_speed, self.density));
                self.prev_present = std::mem::take(&mut self.present);
            }
            self.frame = Some(frame);
        }

        self.mean_speed = obs.mean_speed;
        self.density = obs.density;
        self.present = obs.vehicles.iter().copied().collect();
        self.arrivals = self.present.difference(&self.prev_present).count();

        if self.history_cap > 0 {
            if !new_frame {
                self.history.pop_back();
            } else if self.history.len() == self.history_cap {
                self.history.pop_front();
            }
            self.history.push_back(self.sample());
        }
    }

    /// Recomputes the sensitivity from the current sample.
    ///
    /// # Parameters
    /// * `derivative` - The calibrated d(speed)/d(density) at the current density, if any
    /// * `eps` - Added to the density difference of the finite-difference estimate
    pub(crate) fn update_sensitivity(&mut self, derivative: Option<f64>, eps: f64) {
        let rho = self.density;
        self.sensitivity = match (derivative, self.prev) {
            (Some(dv_drho), _) => -rho * dv_drho,
            (None, Some((prev_v, prev_rho))) => {
                let d_v = prev_v - self.mean_speed;
                let d_rho = prev_rho - rho;
                -rho * d_v / guard(d_rho + eps, eps)
            }
            (None, None) => 0.0,
        };
    }
}
