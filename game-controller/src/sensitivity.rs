use serde::{Deserialize, Serialize};

/// Maps joystick deflection (0..=1) to a camera speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityTable {
    pub joy: Vec<f64>,
    pub cam: Vec<f64>,
}

impl SensitivityTable {
    pub fn new(joy: &[f64], cam: &[f64]) -> Self {
        Self {
            joy: joy.to_vec(),
            cam: cam.to_vec(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.joy.is_empty()
            && self.joy.len() == self.cam.len()
            && self.joy.windows(2).all(|w| w[0] < w[1])
            && self.joy.iter().all(|x| (0.0..=1.0).contains(x))
    }
}

/// Piecewise-linear interpolation, clamped to the first and last points.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }

    for i in 1..n {
        if x <= xs[i] {
            let (x0, x1) = (xs[i - 1], xs[i]);
            let (y0, y1) = (ys[i - 1], ys[i]);
            if x1 == x0 {
                return y1;
            }
            return y0 + (x - x0) * (y1 - y0) / (x1 - x0);
        }
    }
    ys[n - 1]
}

/// Converts an axis position (-1..=1) to a signed camera speed.
///
/// Zero counts as positive; `invert` flips the sign. Halves round to even.
pub fn joy_to_speed(position: f64, table: &SensitivityTable, invert: bool) -> i32 {
    let mut sign = if position >= 0.0 { 1 } else { -1 };
    if invert {
        sign = -sign;
    }
    let magnitude = interp(position.abs(), &table.joy, &table.cam).round_ties_even();
    sign * magnitude as i32
}
