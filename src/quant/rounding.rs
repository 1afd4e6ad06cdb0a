//! Straight-through rounding

use crate::autograd::{parents_of, tracks, BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Round to the nearest integer (half to even) with an identity gradient
pub fn round_ste(x: &Tensor) -> Tensor {
    let data = x.data().mapv(f32::round_ties_even);
    let requires_grad = tracks(x.requires_grad());

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(RoundSteBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct RoundSteBackward {
    x: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for RoundSteBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad.clone());
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        parents_of(&[&self.x])
    }
}
