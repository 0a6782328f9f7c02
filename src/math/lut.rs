use crate::util::Interval;

/// A lookup table of evenly spaced samples, linearly interpolated between samples.
#[derive(Clone, Debug)]
pub struct LookupTable {
    range: Interval<f64>,
    step: f64,
    values: Vec<f64>,
}

impl LookupTable {
    /// Creates a lookup table from a sample function.
    ///
    /// Samples are taken at both ends of `range` and every `step` in between.
    pub fn from_samples(range: Interval<f64>, step: f64, f: impl FnMut(f64) -> f64) -> Self {
        let num_steps = (range.length() / step).ceil().max(1.0) as usize;
        let step = range.length() / num_steps as f64;
        let xs = (0..=num_steps).map(|i| range.min + (i as f64) * step);
        let values = xs.map(f).collect();
        Self {
            range,
            step,
            values,
        }
    }

    /// Samples the lookup table. Inputs outside the sampled range are clamped to it.
    pub fn sample(&self, x: f64) -> f64 {
        if self.step <= 0.0 || !x.is_finite() {
            return self.values[0];
        }
        let idx = (self.range.clamp(x) - self.range.min) / self.step;
        let lo = usize::min(idx.floor() as usize, self.values.len() - 1);
        let hi = usize::min(lo + 1, self.values.len() - 1);
        let t = idx - lo as f64;
        self.values[lo] + t * (self.values[hi] - self.values[lo])
    }
}
