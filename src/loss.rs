//! Loss functions

use crate::autograd::{parents_of, tracks, BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Trait for loss functions
pub trait LossFn {
    /// Compute loss given predictions and targets
    ///
    /// Returns a single-element tensor wired for backpropagation into
    /// `predictions`.
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor;

    /// Name of the loss function
    fn name(&self) -> &str;
}

/// Smooth L1 (Huber-style) loss, mean-reduced
///
/// Quadratic within `beta` of the target and linear beyond it:
///
/// ```text
/// l(d) = 0.5 d² / beta    if |d| < beta
///        |d| - 0.5 beta   otherwise
/// ```
///
/// # Example
///
/// ```
/// use mixq::loss::{LossFn, SmoothL1Loss};
/// use mixq::Tensor;
///
/// let loss_fn = SmoothL1Loss::default();
/// let pred = Tensor::from_vec(vec![3.0], true);
/// let target = Tensor::from_vec(vec![1.0], false);
///
/// let loss = loss_fn.forward(&pred, &target);
/// assert_eq!(loss.item(), 1.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothL1Loss {
    pub beta: f32,
}

impl SmoothL1Loss {
    pub fn new(beta: f32) -> Self {
        Self { beta }
    }
}

impl Default for SmoothL1Loss {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

impl LossFn for SmoothL1Loss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        let beta = self.beta;
        let diff = predictions.data() - targets.data();
        let n = diff.len().max(1) as f32;
        let total: f32 = diff
            .iter()
            .map(|&d| {
                if d.abs() < beta {
                    0.5 * d * d / beta
                } else {
                    d.abs() - 0.5 * beta
                }
            })
            .sum();

        let requires_grad = tracks(predictions.requires_grad());
        let mut loss = Tensor::from_vec(vec![total / n], requires_grad);

        if requires_grad {
            // d(loss)/d(pred) = clamp(d / beta, -1, 1) / n
            let local = diff.mapv(|d| {
                if d.abs() < beta {
                    d / beta / n
                } else {
                    d.signum() / n
                }
            });
            loss.set_backward_op(Rc::new(SmoothL1Backward {
                predictions: predictions.clone(),
                local,
                result_grad: loss.grad_cell(),
            }));
        }

        loss
    }

    fn name(&self) -> &str {
        "SmoothL1"
    }
}

struct SmoothL1Backward {
    predictions: Tensor,
    local: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SmoothL1Backward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.predictions.requires_grad() {
                self.predictions.accumulate_grad(&self.local * grad[0]);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.predictions])
    }
}
