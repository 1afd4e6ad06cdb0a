//! Activation functions and smooth positive maps

use super::tracks;
use crate::autograd::{parents_of, BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Smallest value [`softplus`] returns, so its output stays strictly positive
/// even where `ln(1 + e^x)` underflows.
pub const SCALE_FLOOR: f32 = f32::MIN_POSITIVE;

/// Above this input softplus is the identity to within f32 precision
const SOFTPLUS_THRESHOLD: f32 = 20.0;

fn sigmoid_value(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    let requires_grad = tracks(a.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ReluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ReluBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ReluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * (a > 0)
                let grad_a = grad * &self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Logistic sigmoid
pub fn sigmoid(a: &Tensor) -> Tensor {
    let data = a.data().mapv(sigmoid_value);
    let requires_grad = tracks(a.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SigmoidBackward {
            a: a.clone(),
            output: result.data().clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SigmoidBackward {
    a: Tensor,
    output: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SigmoidBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂σ/∂x = σ(x) * (1 - σ(x))
                let local = self.output.mapv(|s| s * (1.0 - s));
                self.a.accumulate_grad(grad * &local);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Softplus: `ln(1 + e^x)`, floored at [`SCALE_FLOOR`]
pub fn softplus(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| {
        let y = if x > SOFTPLUS_THRESHOLD {
            x
        } else {
            x.max(0.0) + (-x.abs()).exp().ln_1p()
        };
        y.max(SCALE_FLOOR)
    });
    let requires_grad = tracks(a.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SoftplusBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SoftplusBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SoftplusBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂softplus/∂x = σ(x)
                let local = self.a.data().mapv(|x| {
                    if x > SOFTPLUS_THRESHOLD {
                        1.0
                    } else {
                        sigmoid_value(x)
                    }
                });
                self.a.accumulate_grad(grad * &local);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Swish activation (also known as SiLU - Sigmoid Linear Unit)
///
/// Swish(x) = x * sigmoid(x) = x / (1 + e^(-x))
pub fn swish(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x * sigmoid_value(x));
    let requires_grad = tracks(a.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SwishBackward {
            a: a.clone(),
            output: result.data().clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SwishBackward {
    a: Tensor,
    output: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SwishBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂Swish/∂x = Swish(x) + sigmoid(x) * (1 - Swish(x))
                let grad_a: Vec<f32> = self
                    .a
                    .data()
                    .iter()
                    .zip(self.output.iter())
                    .zip(grad_output.iter())
                    .map(|((&x, &swish_x), &grad)| {
                        let sigmoid = sigmoid_value(x);
                        grad * (swish_x + sigmoid * (1.0 - swish_x))
                    })
                    .collect();

                self.a.accumulate_grad(Array1::from(grad_a));
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}

/// Hard-swish: `x * relu6(x + 3) / 6`
pub fn hard_swish(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x * (x + 3.0).clamp(0.0, 6.0) / 6.0);
    let requires_grad = tracks(a.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(HardSwishBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct HardSwishBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for HardSwishBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let local = self.a.data().mapv(|x| {
                    if x <= -3.0 {
                        0.0
                    } else if x >= 3.0 {
                        1.0
                    } else {
                        (2.0 * x + 3.0) / 6.0
                    }
                });
                self.a.accumulate_grad(grad * &local);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.a])
    }
}
