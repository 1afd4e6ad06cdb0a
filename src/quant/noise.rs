//! Stochastic rounding estimator
//!
//! Forward adds one dither value `round(z / 2) * step` to every element, where
//! `z` is a standard normal sample drawn from a generator seeded per
//! invocation. Backward reseeds the same generator, redraws `round(z / 2)` and
//! hands it to `step` as a surrogate derivative, while `x` receives the
//! incoming gradient untouched.

use crate::autograd::{parents_of, tracks, BackwardOp, Tensor};
use crate::error::{Error, Result};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::cell::RefCell;
use std::rc::Rc;

/// Per-invocation state shared by the forward and backward halves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseContext {
    seed: u64,
}

impl NoiseContext {
    /// Context with an explicit seed
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Context with a seed drawn from `rng`
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Integer dither multiple `round(z / 2)` for this context's seed
    pub fn multiple(&self) -> f32 {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let z: f32 = StandardNormal.sample(&mut rng);
        (z / 2.0).round_ties_even()
    }
}

/// Paired forward/backward rule with a hand-specified gradient
pub struct StochasticRound;

impl StochasticRound {
    /// `x + round(z / 2) * step`
    pub fn forward(ctx: &NoiseContext, x: &Array1<f32>, step: f32) -> Array1<f32> {
        let dither = ctx.multiple() * step;
        x.mapv(|v| v + dither)
    }

    /// Gradients with respect to `(x, step)`
    pub fn backward(ctx: &NoiseContext, grad_output: &Array1<f32>) -> (Array1<f32>, f32) {
        let surrogate = ctx.multiple();
        (grad_output.clone(), surrogate * grad_output.sum())
    }
}

/// Differentiable stochastic rounding node
///
/// # Errors
///
/// [`Error::ShapeMismatch`] unless `step` holds exactly one element.
pub fn stochastic_round(x: &Tensor, step: &Tensor, ctx: NoiseContext) -> Result<Tensor> {
    if step.len() != 1 {
        return Err(Error::ShapeMismatch {
            expected: vec![1],
            got: vec![step.len()],
        });
    }
    let data = StochasticRound::forward(&ctx, x.data(), step.item());
    let requires_grad = tracks(x.requires_grad() || step.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(StochasticRoundBackward {
            x: x.clone(),
            step: step.clone(),
            ctx,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct StochasticRoundBackward {
    x: Tensor,
    step: Tensor,
    ctx: NoiseContext,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for StochasticRoundBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let (grad_x, grad_step) = StochasticRound::backward(&self.ctx, grad);
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad_x);
            }
            if self.step.requires_grad() {
                self.step.accumulate_grad(Array1::from_elem(1, grad_step));
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.x, &self.step])
    }
}
