//! Adam with time-based learning rate decay

use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

use crate::error::Result;

/// Adam on top of [`AdamW`] without weight decay
///
/// Update `t` (counting from zero) uses the step size `lr / (1 + decay * t)`.
pub struct Adam {
    inner: AdamW,
    learning_rate: f32,
    decay: f32,
    iterations: u64,
}

impl Adam {
    pub fn new(vars: Vec<Var>, learning_rate: f32, decay: f32) -> Result<Self> {
        let params = ParamsAdamW {
            lr: f64::from(learning_rate),
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            weight_decay: 0.0,
        };
        Ok(Adam {
            inner: AdamW::new(vars, params)?,
            learning_rate,
            decay,
            iterations: 0,
        })
    }

    /// Replaces the base learning rate, the decay keeps counting
    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Step size of the next update
    pub fn decayed_learning_rate(&self) -> f32 {
        self.learning_rate / (1.0 + self.decay * self.iterations as f32)
    }

    /// Back-propagates `loss` and updates every variable that received a gradient
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.inner
            .set_learning_rate(f64::from(self.decayed_learning_rate()));
        self.inner.backward_step(loss)?;
        self.iterations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::Device;

    #[test]
    fn decay_shrinks_the_step_size() {
        let var = Var::new(&[0.0f32], &Device::Cpu).unwrap();
        let mut adam = Adam::new(vec![var.clone()], 0.1, 1.0).unwrap();
        assert_abs_diff_eq!(adam.decayed_learning_rate(), 0.1);

        let loss = var.as_tensor().sum_all().unwrap();
        adam.backward_step(&loss).unwrap();
        assert_eq!(adam.iterations(), 1);
        assert_abs_diff_eq!(adam.decayed_learning_rate(), 0.05);

        adam.set_learning_rate(0.2);
        assert_abs_diff_eq!(adam.decayed_learning_rate(), 0.1);
    }

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        // with bias correction the first Adam step is lr * sign(gradient)
        let var = Var::new(&[1.0f32, -1.0], &Device::Cpu).unwrap();
        let mut adam = Adam::new(vec![var.clone()], 0.01, 0.0).unwrap();
        let loss = (var.as_tensor() * 3.0).unwrap().sum_all().unwrap();
        adam.backward_step(&loss).unwrap();

        let values = var.as_tensor().to_vec1::<f32>().unwrap();
        assert_abs_diff_eq!(values[0], 0.99, epsilon = 1e-5);
        assert_abs_diff_eq!(values[1], -1.01, epsilon = 1e-5);
    }
}
