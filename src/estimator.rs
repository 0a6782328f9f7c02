use crate::calibration::SensitivityCalibration;
use crate::lane::{LaneObservation, LaneState};
use crate::{Error, LaneId, Result};
use log::{debug, warn};
use slotmap::SecondaryMap;

/// The default finite-difference guard.
pub const DEFAULT_EPSILON: f64 = 1e-5;

/// Tracks the macroscopic state of every lane in the network.
///
/// Lanes are enumerated once at construction. Each tick, call [step](Self::step)
/// and then [update](Self::update) every lane before any vehicle is controlled.
pub struct LaneStateEstimator {
    /// The lanes being tracked.
    lanes: SecondaryMap<LaneId, LaneState>,
    /// Calibrated derivative functions, if any were supplied.
    calibration: Option<SensitivityCalibration>,
    /// Added to density differences in the finite-difference estimate.
    eps: f64,
    /// The current tick.
    frame: usize,
}

impl LaneStateEstimator {
    /// Creates an estimator for the given lanes.
    ///
    /// # Parameters
    /// * `lanes` - Each lane's ID, name and length in m
    /// * `eps` - The finite-difference guard, see [DEFAULT_EPSILON]
    /// * `history` - The number of samples to retain per lane, zero to disable
    pub fn new<'a>(
        lanes: impl IntoIterator<Item = (LaneId, &'a str, f64)>,
        eps: f64,
        history: usize,
    ) -> Self {
        let lanes = lanes
            .into_iter()
            .map(|(id, name, length)| (id, LaneState::new(id, name, length, history)))
            .collect();
        Self {
            lanes,
            calibration: None,
            eps,
            frame: 0,
        }
    }

    /// Uses a calibration store in place of finite differences for the lanes it covers.
    pub fn with_calibration(mut self, calibration: SensitivityCalibration) -> Self {
        let missing = self
            .lanes
            .values()
            .filter(|lane| !calibration.contains(lane.id()))
            .count();
        if missing > 0 {
            warn!(
                "{} of {} lanes have no calibration curve, using finite differences",
                missing,
                self.lanes.len()
            );
        }
        self.calibration = Some(calibration);
        self
    }

    /// Starts a new tick. Observations made before the next call belong to this tick.
    pub fn step(&mut self) {
        self.frame += 1;
    }

    /// The current tick.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Records a lane observation for the current tick and recomputes the lane's sensitivity.
    ///
    /// Repeating the same observation within one tick has no further effect. A different
    /// observation for a lane already updated this tick is rejected, since the previous
    /// sample would be lost; call [step](Self::step) between ticks.
    pub fn update(&mut self, lane_id: LaneId, obs: &LaneObservation) -> Result<()> {
        if !obs.mean_speed.is_finite() || !obs.density.is_finite() || obs.density < 0.0 {
            return Err(Error::InvalidObservation {
                lane: lane_id,
                mean_speed: obs.mean_speed,
                density: obs.density,
            });
        }

        let lane = self
            .lanes
            .get_mut(lane_id)
            .ok_or(Error::UnknownLane(lane_id))?;
        if lane.frame() == Some(self.frame)
            && (lane.mean_speed() != obs.mean_speed || lane.density() != obs.density)
        {
            return Err(Error::LaneAlreadyUpdated {
                lane: lane_id,
                frame: self.frame,
            });
        }
        lane.observe(self.frame, obs);

        let derivative = self
            .calibration
            .as_ref()
            .and_then(|c| c.derivative(lane_id, lane.density()));
        lane.update_sensitivity(derivative, self.eps);
        Ok(())
    }

    /// Records the mean speed and density of a lane. [Read more](Self::update).
    pub fn update_speed_density(
        &mut self,
        lane_id: LaneId,
        mean_speed: f64,
        density: f64,
    ) -> Result<()> {
        let obs = LaneObservation {
            mean_speed,
            density,
            vehicles: vec![],
        };
        self.update(lane_id, &obs)
    }

    /// Gets the sensitivity coefficient of a lane.
    pub fn sensitivity(&self, lane_id: LaneId) -> Result<f64> {
        self.get(lane_id).map(LaneState::sensitivity)
    }

    /// Gets the state of a lane.
    pub fn get(&self, lane_id: LaneId) -> Result<&LaneState> {
        self.lanes.get(lane_id).ok_or(Error::UnknownLane(lane_id))
    }

    /// Returns an iterator over all the lane states.
    pub fn states(&self) -> impl Iterator<Item = &LaneState> {
        self.lanes.values()
    }

    /// Returns an iterator over all the tracked lane IDs.
    pub fn lane_ids(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.lanes.keys()
    }

    /// Logs a one-line summary of every lane.
    pub fn log_summary(&self) {
        for lane in self.lanes.values() {
            debug!(
                "{}| Lane `{}`: a={:.2}, v={:.2}, r={:.3}, q={:.3}",
                self.frame,
                lane.name(),
                lane.sensitivity(),
                lane.mean_speed(),
                lane.density(),
                lane.flow()
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::CalibrationCurve;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::SlotMap;

    fn setup() -> (SlotMap<LaneId, ()>, LaneId, LaneStateEstimator) {
        let mut ids = SlotMap::with_key();
        let lane = ids.insert(());
        let estimator = LaneStateEstimator::new([(lane, "main_0", 250.0)], DEFAULT_EPSILON, 0);
        (ids, lane, estimator)
    }

    #[test]
    fn flow_is_density_times_speed() {
        let (_, lane, mut est) = setup();
        for (v, rho) in [(13.0, 0.02), (9.5, 0.11), (0.0, 0.4)] {
            est.step();
            est.update_speed_density(lane, v, rho).unwrap();
            let state = est.get(lane).unwrap();
            assert_approx_eq!(state.flow(), v * rho);
        }
    }

    #[test]
    fn unchanged_density_is_guarded() {
        let (_, lane, mut est) = setup();
        est.step();
        est.update_speed_density(lane, 10.0, 0.2).unwrap();
        est.step();
        est.update_speed_density(lane, 8.0, 0.2).unwrap();
        let alpha = est.sensitivity(lane).unwrap();
        assert!(alpha.is_finite());
        assert_approx_eq!(alpha, -0.2 * 2.0 / DEFAULT_EPSILON, 1e-3);
    }

    #[test]
    fn repeated_update_within_tick_is_idempotent() {
        let (_, lane, mut est) = setup();
        est.step();
        est.update_speed_density(lane, 10.0, 0.1).unwrap();
        est.step();
        est.update_speed_density(lane, 9.0, 0.15).unwrap();
        let once = est.sensitivity(lane).unwrap();
        est.update_speed_density(lane, 9.0, 0.15).unwrap();
        let twice = est.sensitivity(lane).unwrap();
        assert_eq!(once, twice);
        assert!(once != 0.0);
    }

    #[test]
    fn changed_observation_without_step_is_rejected() {
        let (_, lane, mut est) = setup();
        est.update_speed_density(lane, 12.0, 0.1).unwrap();
        let result = est.update_speed_density(lane, 10.0, 0.2);
        assert!(matches!(
            result,
            Err(Error::LaneAlreadyUpdated { lane: id, frame: 0 }) if id == lane
        ));
        assert_approx_eq!(est.get(lane).unwrap().mean_speed(), 12.0);

        est.step();
        est.update_speed_density(lane, 10.0, 0.2).unwrap();
        assert!(est.sensitivity(lane).unwrap() != 0.0);
    }

    #[test]
    fn unknown_lane_is_reported() {
        let (mut ids, _, mut est) = setup();
        let other = ids.insert(());
        let result = est.update_speed_density(other, 10.0, 0.1);
        assert!(matches!(result, Err(Error::UnknownLane(id)) if id == other));
        assert!(est.sensitivity(other).is_err());
    }

    #[test]
    fn negative_density_is_rejected() {
        let (_, lane, mut est) = setup();
        let result = est.update_speed_density(lane, 10.0, -0.1);
        assert!(matches!(result, Err(Error::InvalidObservation { .. })));
    }

    #[test]
    fn calibrated_lane_uses_curve() {
        let (_, lane, est) = setup();
        let mut calibration = SensitivityCalibration::new();
        calibration
            .insert(lane, &CalibrationCurve::Constant { slope: -20.0 })
            .unwrap();
        let mut est = est.with_calibration(calibration);
        est.step();
        est.update_speed_density(lane, 10.0, 0.1).unwrap();
        assert_approx_eq!(est.sensitivity(lane).unwrap(), 2.0);
    }

    #[test]
    fn calibration_function_is_evaluated_at_density() {
        let (_, lane, est) = setup();
        let mut calibration = SensitivityCalibration::new();
        calibration.insert_fn(lane, |rho| -30.0 * (1.0 + rho));
        let mut est = est.with_calibration(calibration);
        est.step();
        est.update_speed_density(lane, 9.0, 0.2).unwrap();
        assert_approx_eq!(est.sensitivity(lane).unwrap(), 7.2);
    }
}
