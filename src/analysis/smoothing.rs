//! Exponential moving average across refresh ticks

/// Element-wise exponential moving average of successive series
///
/// `alpha = 2 / (factor + 1)`, so a factor of 1 is the identity. State is
/// restarted from the incoming series whenever its length changes.
#[derive(Debug, Clone, Default)]
pub struct Ema {
    factor: u32,
    state: Option<Vec<f64>>,
}

impl Ema {
    /// Create an average with the given factor (values below 1 act as 1)
    pub fn new(factor: u32) -> Self {
        Self {
            factor: factor.max(1),
            state: None,
        }
    }

    /// Smoothing factor
    pub fn factor(&self) -> u32 {
        self.factor
    }

    /// Weight of the newest series
    pub fn alpha(&self) -> f64 {
        2.0 / (self.factor as f64 + 1.0)
    }

    /// Change the factor; the running average restarts
    pub fn set_factor(&mut self, factor: u32) {
        let factor = factor.max(1);
        if factor != self.factor {
            self.factor = factor;
            self.state = None;
        }
    }

    /// Forget the running average
    pub fn reset(&mut self) {
        self.state = None;
    }

    /// Fold a new series into the average and return the smoothed series
    pub fn apply(&mut self, data: &[f64]) -> Vec<f64> {
        if self.factor <= 1 {
            self.state = None;
            return data.to_vec();
        }

        let alpha = self.alpha();
        match &mut self.state {
            Some(state) if state.len() == data.len() => {
                for (s, &y) in state.iter_mut().zip(data) {
                    *s += alpha * (y - *s);
                }
                state.clone()
            }
            _ => {
                self.state = Some(data.to_vec());
                data.to_vec()
            }
        }
    }
}
