//! Broadcasting a single-element tensor across another tensor
//!
//! The second operand of each op must hold exactly one element; its gradient is
//! the reduction of the broadcast gradient.

use super::tracks;
use crate::autograd::{parents_of, BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

fn scalar_of(s: &Tensor) -> f32 {
    assert_eq!(s.len(), 1, "broadcast operand must hold exactly one element");
    s.item()
}

/// `x + s` with `s` broadcast
pub fn add_scalar(x: &Tensor, s: &Tensor) -> Tensor {
    let value = scalar_of(s);
    let data = x.data().mapv(|v| v + value);
    let requires_grad = tracks(x.requires_grad() || s.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddScalarBackward {
            x: x.clone(),
            s: s.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddScalarBackward {
    x: Tensor,
    s: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddScalarBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad.clone());
            }
            if self.s.requires_grad() {
                self.s.accumulate_grad(Array1::from_elem(1, grad.sum()));
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.x, &self.s])
    }
}

/// `x * s` with `s` broadcast
pub fn mul_scalar(x: &Tensor, s: &Tensor) -> Tensor {
    let value = scalar_of(s);
    let data = x.data() * value;
    let requires_grad = tracks(x.requires_grad() || s.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MulScalarBackward {
            x: x.clone(),
            s: s.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MulScalarBackward {
    x: Tensor,
    s: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MulScalarBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let value = self.s.item();
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad * value);
            }
            if self.s.requires_grad() {
                // ∂L/∂s = Σ ∂L/∂out * x
                let grad_s = (grad * self.x.data()).sum();
                self.s.accumulate_grad(Array1::from_elem(1, grad_s));
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.x, &self.s])
    }
}

/// `x / s` with `s` broadcast
pub fn div_scalar(x: &Tensor, s: &Tensor) -> Tensor {
    let value = scalar_of(s);
    let data = x.data() / value;
    let requires_grad = tracks(x.requires_grad() || s.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DivScalarBackward {
            x: x.clone(),
            s: s.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct DivScalarBackward {
    x: Tensor,
    s: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for DivScalarBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let value = self.s.item();
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad / value);
            }
            if self.s.requires_grad() {
                // ∂(x/s)/∂s = -x / s²
                let grad_s = -(grad * self.x.data()).sum() / (value * value);
                self.s.accumulate_grad(Array1::from_elem(1, grad_s));
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.x, &self.s])
    }
}
