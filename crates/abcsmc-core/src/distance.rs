//! Coerces and validates the caller's `distance` callback (spec §4.5):
//! fixes the number of summary statistics `S` on first call, rejects NaN or
//! negative entries, and enforces `S = 1` whenever adaptive tolerance
//! selection is in effect.

use crate::simulator::Trajectory;
use abcsmc_common::{Error, Result};
use nalgebra::DMatrix;
use serde_json::Value;

/// The user-supplied distance capability (spec §9's "user callbacks as
/// first-class values"): either a concrete type or any matching closure.
pub trait Distance: Send + Sync {
    fn evaluate(&self, trajectory: &Trajectory, generation: usize, data: &Value) -> Result<DMatrix<f64>>;
}

impl<F> Distance for F
where
    F: Fn(&Trajectory, usize, &Value) -> Result<DMatrix<f64>> + Send + Sync,
{
    fn evaluate(&self, trajectory: &Trajectory, generation: usize, data: &Value) -> Result<DMatrix<f64>> {
        self(trajectory, generation, data)
    }
}

/// Wraps a `Distance` implementation, remembering the summary-statistic
/// count `S` fixed by its first call.
pub struct DistanceAdapter<'a> {
    inner: &'a dyn Distance,
    fixed_s: Option<usize>,
    adaptive: bool,
}

impl<'a> DistanceAdapter<'a> {
    pub fn new(inner: &'a dyn Distance, adaptive: bool) -> Self {
        DistanceAdapter { inner, fixed_s: None, adaptive }
    }

    pub fn fixed_s(&self) -> Option<usize> {
        self.fixed_s
    }

    pub fn evaluate(
        &mut self,
        trajectory: &Trajectory,
        generation: usize,
        data: &Value,
    ) -> Result<DMatrix<f64>> {
        let raw = self.inner.evaluate(trajectory, generation, data)?;

        if raw.iter().any(|v| v.is_nan()) {
            return Err(Error::Distance("distance output contains NaN".into()));
        }
        if raw.iter().any(|v| *v < 0.0) {
            return Err(Error::Distance("distance output must be non-negative".into()));
        }

        let s = raw.ncols();
        match self.fixed_s {
            None => self.fixed_s = Some(s),
            Some(expected) if expected != s => {
                return Err(Error::DistanceShapeMismatch { expected, actual: s })
            }
            _ => {}
        }
        if self.adaptive && s != 1 {
            return Err(Error::AdaptiveRequiresUnivariate { actual: s });
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_distance(values: Vec<f64>, cols: usize) -> impl Distance {
        move |_: &Trajectory, _: usize, _: &Value| {
            Ok(DMatrix::from_row_slice(values.len() / cols, cols, &values))
        }
    }

    #[test]
    fn fixes_s_on_first_call_and_rejects_mismatch() {
        let distance = ok_distance(vec![0.1, 0.2], 1);
        let mut adapter = DistanceAdapter::new(&distance, false);
        let trajectory = Trajectory::new(Value::Null);
        adapter.evaluate(&trajectory, 0, &Value::Null).unwrap();
        assert_eq!(adapter.fixed_s(), Some(1));

        let two_col = ok_distance(vec![0.1, 0.2], 2);
        let mut adapter2 = DistanceAdapter::new(&two_col, false);
        adapter2.evaluate(&trajectory, 0, &Value::Null).unwrap();
        assert_eq!(adapter2.fixed_s(), Some(2));
    }

    #[test]
    fn rejects_nan_and_negative_values() {
        let trajectory = Trajectory::new(Value::Null);

        let nan = ok_distance(vec![f64::NAN], 1);
        let mut adapter = DistanceAdapter::new(&nan, false);
        assert!(adapter.evaluate(&trajectory, 0, &Value::Null).is_err());

        let negative = ok_distance(vec![-1.0], 1);
        let mut adapter = DistanceAdapter::new(&negative, false);
        assert!(adapter.evaluate(&trajectory, 0, &Value::Null).is_err());
    }

    #[test]
    fn adaptive_mode_rejects_s_greater_than_one() {
        let distance = ok_distance(vec![0.1, 0.2], 2);
        let mut adapter = DistanceAdapter::new(&distance, true);
        let trajectory = Trajectory::new(Value::Null);
        assert!(adapter.evaluate(&trajectory, 0, &Value::Null).is_err());
    }
}
