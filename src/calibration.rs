//! Precomputed density to speed-sensitivity relationships.

use crate::math::LookupTable;
use crate::util::Interval;
use crate::{Error, LaneId, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::BTreeMap;
use std::path::Path;

/// The number of lookup table cells a sampled curve is resampled into.
const LUT_RESOLUTION: f64 = 256.0;

/// A density to d(mean speed)/d(density) relationship for one lane, as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalibrationCurve {
    /// The derivative does not depend on density.
    Constant { slope: f64 },
    /// Greenshields' linear speed-density relation, `v = v_f * (1 - rho / rho_j)`.
    Greenshields { free_speed: f64, jam_density: f64 },
    /// Derivative samples at increasing densities, linearly interpolated.
    Sampled { densities: Vec<f64>, slopes: Vec<f64> },
}

/// A lane's derivative function, ready to evaluate.
enum Derivative {
    Constant(f64),
    Table(LookupTable),
    Custom(Box<dyn Fn(f64) -> f64>),
}

/// Maps lanes to their calibrated d(mean speed)/d(density) functions.
///
/// Lanes without an entry fall back to finite-difference estimation.
#[derive(Default)]
pub struct SensitivityCalibration {
    curves: SecondaryMap<LaneId, Derivative>,
}

impl CalibrationCurve {
    /// Checks the curve parameters and builds its evaluator.
    fn compile(&self) -> Result<Derivative> {
        match self {
            Self::Constant { slope } => {
                if !slope.is_finite() {
                    return Err(Error::Config(format!("constant slope {} is not finite", slope)));
                }
                Ok(Derivative::Constant(*slope))
            }
            Self::Greenshields {
                free_speed,
                jam_density,
            } => {
                if !(*free_speed > 0.0) || !(*jam_density > 0.0) {
                    return Err(Error::Config(format!(
                        "greenshields curve needs positive free speed and jam density, got {} and {}",
                        free_speed, jam_density
                    )));
                }
                Ok(Derivative::Constant(-free_speed / jam_density))
            }
            Self::Sampled { densities, slopes } => {
                if densities.is_empty() || densities.len() != slopes.len() {
                    return Err(Error::Config(format!(
                        "sampled curve has {} densities and {} slopes",
                        densities.len(),
                        slopes.len()
                    )));
                }
                if densities.iter().chain(slopes).any(|x| !x.is_finite()) {
                    return Err(Error::Config("sampled curve contains non-finite values".into()));
                }
                if densities.iter().tuple_windows().any(|(a, b)| a >= b) {
                    return Err(Error::Config(
                        "sampled curve densities must be strictly increasing".into(),
                    ));
                }
                let points = densities.iter().copied().zip(slopes.iter().copied()).collect_vec();
                let range = Interval::new(densities[0], densities[densities.len() - 1]);
                let step = f64::max(range.length() / LUT_RESOLUTION, f64::EPSILON);
                let lut = LookupTable::from_samples(range, step, |x| interpolate(&points, x));
                Ok(Derivative::Table(lut))
            }
        }
    }
}

/// Piecewise-linear interpolation through `points`, held constant beyond the ends.
fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    let (first, last) = (points[0], points[points.len() - 1]);
    if x <= first.0 {
        return first.1;
    }
    points
        .iter()
        .tuple_windows()
        .find(|(_, b)| x <= b.0)
        .map(|(a, b)| {
            let t = Interval::new(a.0, b.0).inv_lerp(x);
            a.1 + t * (b.1 - a.1)
        })
        .unwrap_or(last.1)
}

impl Derivative {
    fn eval(&self, density: f64) -> f64 {
        match self {
            Self::Constant(slope) => *slope,
            Self::Table(lut) => lut.sample(density),
            Self::Custom(f) => f(density),
        }
    }
}

impl SensitivityCalibration {
    /// Creates an empty calibration store.
    pub fn new() -> Self {
        Default::default()
    }

    /// Builds a calibration store from curves keyed by lane name.
    ///
    /// # Parameters
    /// * `curves` - The curves, keyed by lane name
    /// * `lanes` - Every lane known to the network, with its name
    pub fn from_named<'a>(
        curves: &BTreeMap<String, CalibrationCurve>,
        lanes: impl IntoIterator<Item = (LaneId, &'a str)>,
    ) -> Result<Self> {
        let names = lanes
            .into_iter()
            .map(|(id, name)| (name, id))
            .collect::<BTreeMap<_, _>>();
        let mut calibration = Self::new();
        for (name, curve) in curves {
            let lane_id = names
                .get(name.as_str())
                .ok_or_else(|| Error::UnknownCalibrationLane(name.clone()))?;
            calibration.insert(*lane_id, curve)?;
        }
        Ok(calibration)
    }

    /// Reads a JSON calibration store from disk. [Read more](Self::from_named).
    pub fn load<'a>(
        path: impl AsRef<Path>,
        lanes: impl IntoIterator<Item = (LaneId, &'a str)>,
    ) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let curves: BTreeMap<String, CalibrationCurve> = serde_json::from_str(&content)?;
        Self::from_named(&curves, lanes)
    }

    /// Sets the calibration curve for a lane.
    pub fn insert(&mut self, lane_id: LaneId, curve: &CalibrationCurve) -> Result<()> {
        let derivative = curve.compile()?;
        self.curves.insert(lane_id, derivative);
        Ok(())
    }

    /// Sets an arbitrary derivative function for a lane.
    pub fn insert_fn(&mut self, lane_id: LaneId, f: impl Fn(f64) -> f64 + 'static) {
        self.curves.insert(lane_id, Derivative::Custom(Box::new(f)));
    }

    /// Whether the lane has a calibration curve.
    pub fn contains(&self, lane_id: LaneId) -> bool {
        self.curves.contains_key(lane_id)
    }

    /// The number of calibrated lanes.
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Evaluates d(mean speed)/d(density) for the lane, if it is calibrated.
    pub fn derivative(&self, lane_id: LaneId, density: f64) -> Option<f64> {
        self.curves.get(lane_id).map(|d| d.eval(density))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::SlotMap;

    fn lanes() -> SlotMap<LaneId, &'static str> {
        let mut lanes = SlotMap::with_key();
        lanes.insert("east_0");
        lanes.insert("east_1");
        lanes
    }

    #[test]
    fn greenshields_slope() {
        let lanes = lanes();
        let (id, _) = lanes.iter().next().unwrap();
        let mut calibration = SensitivityCalibration::new();
        let curve = CalibrationCurve::Greenshields {
            free_speed: 30.0,
            jam_density: 0.15,
        };
        calibration.insert(id, &curve).unwrap();
        assert_approx_eq!(calibration.derivative(id, 0.02).unwrap(), -200.0);
        assert_approx_eq!(calibration.derivative(id, 0.1).unwrap(), -200.0);
    }

    #[test]
    fn sampled_curve_interpolates() {
        let curve = CalibrationCurve::Sampled {
            densities: vec![0.0, 0.1, 0.2],
            slopes: vec![-100.0, -300.0, -300.0],
        };
        let lanes = lanes();
        let (id, _) = lanes.iter().next().unwrap();
        let mut calibration = SensitivityCalibration::new();
        calibration.insert(id, &curve).unwrap();

        assert_approx_eq!(calibration.derivative(id, 0.05).unwrap(), -200.0, 1e-6);
        assert_approx_eq!(calibration.derivative(id, 0.15).unwrap(), -300.0, 1e-6);
        assert_approx_eq!(calibration.derivative(id, -1.0).unwrap(), -100.0, 1e-6);
        assert_approx_eq!(calibration.derivative(id, 5.0).unwrap(), -300.0, 1e-6);
    }

    #[test]
    fn function_replaces_curve() {
        let lanes = lanes();
        let (id, _) = lanes.iter().next().unwrap();
        let mut calibration = SensitivityCalibration::new();
        calibration
            .insert(id, &CalibrationCurve::Constant { slope: -1.0 })
            .unwrap();
        calibration.insert_fn(id, |rho| -400.0 * rho);

        assert_eq!(calibration.len(), 1);
        assert_approx_eq!(calibration.derivative(id, 0.05).unwrap(), -20.0);
        assert_approx_eq!(calibration.derivative(id, 0.25).unwrap(), -100.0);
    }

    #[test]
    fn rejects_unsorted_samples() {
        let curve = CalibrationCurve::Sampled {
            densities: vec![0.2, 0.1],
            slopes: vec![-1.0, -2.0],
        };
        assert!(matches!(curve.compile(), Err(Error::Config(_))));
    }

    #[test]
    fn binds_curves_by_name() {
        let lanes = lanes();
        let json = r#"{
            "east_1": { "type": "constant", "slope": -50.0 }
        }"#;
        let curves: BTreeMap<String, CalibrationCurve> = serde_json::from_str(json).unwrap();
        let calibration =
            SensitivityCalibration::from_named(&curves, lanes.iter().map(|(id, n)| (id, *n)))
                .unwrap();

        assert_eq!(calibration.len(), 1);
        for (id, name) in &lanes {
            assert_eq!(calibration.contains(id), *name == "east_1");
        }
    }

    #[test]
    fn unknown_lane_name_is_an_error() {
        let lanes = lanes();
        let mut curves = BTreeMap::new();
        curves.insert("north_0".to_string(), CalibrationCurve::Constant { slope: -1.0 });
        let result =
            SensitivityCalibration::from_named(&curves, lanes.iter().map(|(id, n)| (id, *n)));
        assert!(matches!(result, Err(Error::UnknownCalibrationLane(name)) if name == "north_0"));
    }
}
