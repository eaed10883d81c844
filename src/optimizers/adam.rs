//! Adam (Adaptive Moment Estimation) optimizer implementation
//!
//! This module provides the Adam optimizer, which combines momentum and
//! adaptive learning rates with bias correction for improved convergence.
//! Gradient accumulation is shared with [`GradientDescent`]; only the update
//! rule differs.

use super::{GradientDescent, Optimizer, Parameters};
use crate::error::{Error, Result};
use ndarray::{ArrayD, ArrayView1, Zip};

/// Adam (Adaptive Moment Estimation) optimizer.
///
/// Adam maintains two moving averages for each parameter:
///
/// 1. First moment (mean) of gradients (momentum)
/// 2. Second moment (uncentered variance) of gradients (adaptive learning rate)
///
/// The update rule is:
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * gradient
/// v_t = β2 * v_{t-1} + (1 - β2) * gradient²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// where `gradient` is everything accumulated since the previous update.
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
#[derive(Debug, Clone)]
pub struct Adam {
    descent: GradientDescent,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimates (momentum)
    m: Vec<ArrayD<f32>>,
    /// Second moment estimates (adaptive learning rate)
    v: Vec<ArrayD<f32>>,
    /// Time step counter for bias correction
    t: i32,
}

impl Adam {
    /// Creates a new Adam optimizer with the specified hyperparameters.
    ///
    /// # Arguments
    ///
    /// * `learning_rate` - The step size for parameter updates (α, must be positive)
    /// * `beta1` - Exponential decay rate for first moment estimates (0 < β1 < 1)
    /// * `beta2` - Exponential decay rate for second moment estimates (0 < β2 < 1)
    /// * `epsilon` - Small constant for numerical stability (must be positive)
    ///
    /// # Panics
    ///
    /// Panics if any hyperparameter is outside its range.
    ///
    /// # Typical Values
    ///
    /// The Adam paper recommends 0.001, 0.9, 0.999 and 1e-8, which is what
    /// [`Adam::default`] uses.
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        assert!(beta1 > 0.0 && beta1 < 1.0, "beta1 must be in (0, 1)");
        assert!(beta2 > 0.0 && beta2 < 1.0, "beta2 must be in (0, 1)");
        assert!(epsilon > 0.0, "epsilon must be positive");
        Self {
            descent: GradientDescent::new(learning_rate),
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    /// Number of updates applied so far.
    pub fn step(&self) -> i32 {
        self.t
    }

    pub fn beta1(&self) -> f32 {
        self.beta1
    }

    pub fn beta2(&self) -> f32 {
        self.beta2
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl Default for Adam {
    fn default() -> Self {
        Adam::new(0.001, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "Adam"
    }

    fn initialize(&mut self, parameters: &dyn Parameters, input_size: usize) -> Result<()> {
        self.descent.initialize(parameters, input_size)?;
        self.m = self.descent.gradient().iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
        self.v = self.m.clone();
        self.t = 0;
        Ok(())
    }

    fn reset(&mut self) {
        self.descent.reset();
    }

    fn forward(&mut self, input: ArrayView1<f32>) -> Result<()> {
        self.descent.forward(input)
    }

    fn backward(
        &mut self,
        parameters: &dyn Parameters,
        forward_error: ArrayView1<f32>,
    ) -> Result<()> {
        self.descent.backward(parameters, forward_error)
    }

    /// Update parameters using the Adam rule.
    ///
    /// Steps per tensor:
    /// 1. Update biased first moment estimate (momentum)
    /// 2. Update biased second moment estimate (adaptive learning rate)
    /// 3. Compute bias-corrected estimates
    /// 4. Update parameters using corrected estimates
    fn update(&mut self, parameters: &mut dyn Parameters) -> Result<()> {
        if !self.descent.is_initialized() {
            return Err(Error::OptimizerNotInitialized(self.name().to_owned()));
        }
        let mut tensors = parameters.tensors_mut();
        if tensors.len() != self.m.len() {
            return Err(Error::SizeMismatch {
                expected: self.m.len(),
                actual: tensors.len(),
            });
        }

        self.t += 1;
        let lr = self.descent.learning_rate();
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias_correction1 = 1.0 - beta1.powi(self.t);
        let bias_correction2 = 1.0 - beta2.powi(self.t);

        let gradients = self.descent.gradient();
        for (((tensor, gradient), m), v) in tensors
            .iter_mut()
            .zip(gradients)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            Zip::from(tensor)
                .and(gradient)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
                });
        }
        self.descent.reset();
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.descent.learning_rate()
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.descent.set_learning_rate(learning_rate);
    }
}
