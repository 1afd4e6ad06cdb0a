//! Backward operation trait and graph ordering

use super::Tensor;
use std::collections::HashSet;
use std::rc::Rc;

/// Trait for backward pass operations
pub trait BackwardOp {
    /// Accumulate this op's local gradient into the gradient cells of its inputs
    fn backward(&self);

    /// Ops that produced this op's inputs
    fn parents(&self) -> Vec<Rc<dyn BackwardOp>>;
}

/// Producers of the given inputs, skipping leaves
pub(crate) fn parents_of(inputs: &[&Tensor]) -> Vec<Rc<dyn BackwardOp>> {
    inputs.iter().filter_map(|t| t.backward_op()).collect()
}

fn op_key(op: &Rc<dyn BackwardOp>) -> usize {
    Rc::as_ptr(op) as *const () as usize
}

/// Order the graph below `root` so that every op precedes the producers of its inputs.
///
/// Iterative depth-first post-order, reversed. Each op appears exactly once.
pub(crate) fn topological_order(root: Rc<dyn BackwardOp>) -> Vec<Rc<dyn BackwardOp>> {
    let mut visited: HashSet<usize> = HashSet::new();
    let mut post_order = Vec::new();
    let mut stack: Vec<(Rc<dyn BackwardOp>, bool)> = vec![(root, false)];

    while let Some((op, expanded)) = stack.pop() {
        if expanded {
            post_order.push(op);
            continue;
        }
        if !visited.insert(op_key(&op)) {
            continue;
        }
        let parents = op.parents();
        stack.push((op, true));
        for parent in parents {
            if !visited.contains(&op_key(&parent)) {
                stack.push((parent, false));
            }
        }
    }

    post_order.reverse();
    post_order
}
