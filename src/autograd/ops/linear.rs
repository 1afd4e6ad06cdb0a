//! Affine transform `y = x @ Wᵀ + b`

use super::tracks;
use crate::autograd::{parents_of, BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Affine transform of a batch
///
/// # Arguments
/// * `x` - Input (batch × in_features, flattened)
/// * `weight` - Weight (out_features × in_features, flattened)
/// * `bias` - Optional bias (out_features)
///
/// Returns a tensor of batch × out_features, flattened.
pub fn linear(
    x: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    batch: usize,
    in_features: usize,
    out_features: usize,
) -> Tensor {
    assert_eq!(x.len(), batch * in_features, "linear: input size mismatch");
    assert_eq!(
        weight.len(),
        out_features * in_features,
        "linear: weight size mismatch"
    );
    if let Some(b) = bias {
        assert_eq!(b.len(), out_features, "linear: bias size mismatch");
    }

    let xd = x.data();
    let wd = weight.data();
    let mut out = vec![0.0; batch * out_features];
    for n in 0..batch {
        for o in 0..out_features {
            let mut acc = bias.map_or(0.0, |b| b.data()[o]);
            for i in 0..in_features {
                acc += xd[n * in_features + i] * wd[o * in_features + i];
            }
            out[n * out_features + o] = acc;
        }
    }

    let requires_grad = tracks(
        x.requires_grad() || weight.requires_grad() || bias.is_some_and(|b| b.requires_grad()),
    );
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LinearBackward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            batch,
            in_features,
            out_features,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LinearBackward {
    x: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    batch: usize,
    in_features: usize,
    out_features: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LinearBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let (batch, fin, fout) = (self.batch, self.in_features, self.out_features);

            // ∂L/∂x = ∂L/∂y @ W
            if self.x.requires_grad() {
                let wd = self.weight.data();
                let mut grad_x = vec![0.0; batch * fin];
                for n in 0..batch {
                    for o in 0..fout {
                        let g = grad_output[n * fout + o];
                        for i in 0..fin {
                            grad_x[n * fin + i] += g * wd[o * fin + i];
                        }
                    }
                }
                self.x.accumulate_grad(Array1::from(grad_x));
            }

            // ∂L/∂W = ∂L/∂yᵀ @ x
            if self.weight.requires_grad() {
                let xd = self.x.data();
                let mut grad_w = vec![0.0; fout * fin];
                for n in 0..batch {
                    for o in 0..fout {
                        let g = grad_output[n * fout + o];
                        for i in 0..fin {
                            grad_w[o * fin + i] += g * xd[n * fin + i];
                        }
                    }
                }
                self.weight.accumulate_grad(Array1::from(grad_w));
            }

            if let Some(bias) = self.bias.as_ref().filter(|b| b.requires_grad()) {
                let mut grad_b = vec![0.0; fout];
                for n in 0..batch {
                    for o in 0..fout {
                        grad_b[o] += grad_output[n * fout + o];
                    }
                }
                bias.accumulate_grad(Array1::from(grad_b));
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        let mut inputs = vec![&self.x, &self.weight];
        if let Some(b) = &self.bias {
            inputs.push(b);
        }
        parents_of(&inputs)
    }
}
