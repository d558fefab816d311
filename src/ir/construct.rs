//! Incremental, SSA-style continuation construction.
//!
//! While a function is being built, each continuation carries a symbol table
//! mapping opaque slot handles to their current value. Reading a slot that
//! has no local binding either delegates to the construction parent, appends
//! a fresh param on an unsealed continuation (deferring the argument wiring
//! to seal time), or resolves through the predecessors — introducing a
//! phi-like param only when the incoming values actually differ.
//!
//! Params that turn out trivial (all incoming arguments equal one value, up
//! to self references) are eliminated after the fact, and the elimination
//! retries transitively through jumps that forwarded the removed param.

use super::node::{NodeId, Todo, Use};
use super::types::TypeId;
use super::world::World;

impl World {
    /// Record `def` as the current value of `handle` in `lambda`.
    pub fn set_value(&mut self, lambda: NodeId, handle: usize, def: NodeId) {
        self.lambda_data_mut(lambda).values.insert(handle, def);
    }

    /// Drop the construction symbol table of `lambda`.
    pub fn clear_values(&mut self, lambda: NodeId) {
        self.lambda_data_mut(lambda).values.clear();
    }

    fn value(&self, lambda: NodeId, handle: usize) -> Option<NodeId> {
        self.lambda_data(lambda)
            .values
            .get(&handle)
            .map(|&d| self.deref(d))
    }

    /// The incoming (predecessor, argument) pairs feeding a param.
    pub fn peek(&self, param: NodeId) -> Vec<(NodeId, NodeId)> {
        let lambda = self.param_lambda(param);
        let index = self.param_index(param);
        self.preds(lambda)
            .into_iter()
            .filter_map(|pred| {
                self.ops(pred)
                    .get(index + 1)
                    .copied()
                    .filter(|a| a.is_valid())
                    .map(|a| (pred, self.deref(a)))
            })
            .collect()
    }

    /// The current value of `handle` as seen from `lambda`.
    ///
    /// Reading a slot that is undefined on some path is recovered locally: a
    /// bottom value of `ty` is synthesized and a diagnostic line goes to
    /// stderr.
    pub fn get_value(&mut self, lambda: NodeId, handle: usize, ty: TypeId, name: &str) -> NodeId {
        if let Some(def) = self.value(lambda, handle) {
            return def;
        }

        let parent = self.lambda_data(lambda).parent;
        if parent != lambda {
            // not a function head: resolve where this block was created
            if parent.is_valid() {
                return self.get_value(parent, handle, ty, name);
            }
            return self.undefined(lambda, handle, ty, name);
        }

        if !self.is_sealed(lambda) {
            // predecessors unknown: defer the wiring to seal time
            let param = self.append_param(lambda, ty, name);
            let index = self.param_index(param);
            self.lambda_data_mut(lambda).todos.push(Todo {
                handle,
                index,
                ty,
                name: name.to_string(),
            });
            self.set_value(lambda, handle, param);
            return param;
        }

        let preds = self.preds(lambda);
        match preds.len() {
            0 => self.undefined(lambda, handle, ty, name),
            1 => {
                let def = self.get_value(preds[0], handle, ty, name);
                self.set_value(lambda, handle, def);
                def
            }
            _ => {
                if self.lambda_data(lambda).in_flight {
                    // lookup cycle: break it with a param
                    let param = self.append_param(lambda, ty, name);
                    self.set_value(lambda, handle, param);
                    return param;
                }

                self.lambda_data_mut(lambda).in_flight = true;
                let mut same = None;
                let mut differs = false;
                for &pred in &preds {
                    let def = self.get_value(pred, handle, ty, name);
                    match same {
                        None => same = Some(def),
                        Some(s) if s != def => {
                            differs = true;
                            break;
                        }
                        _ => {}
                    }
                }
                self.lambda_data_mut(lambda).in_flight = false;
                let same = same.expect("predecessor lookup yielded no value");

                if !differs {
                    return same;
                }

                // a cycle may already have appended the param for us
                let param = match self.value(lambda, handle) {
                    Some(param) => param,
                    None => self.append_param(lambda, ty, name),
                };
                let index = self.param_index(param);
                let fixed = self.fix(
                    lambda,
                    Todo {
                        handle,
                        index,
                        ty,
                        name: name.to_string(),
                    },
                );
                self.set_value(lambda, handle, fixed);
                fixed
            }
        }
    }

    fn undefined(&mut self, lambda: NodeId, handle: usize, ty: TypeId, name: &str) -> NodeId {
        eprintln!("'{name}' may be undefined");
        let bottom = self.bottom(ty);
        self.set_value(lambda, handle, bottom);
        bottom
    }

    /// Freeze the predecessor set and run the queued param fix-ups.
    pub fn seal(&mut self, lambda: NodeId) {
        {
            let data = self.lambda_data_mut(lambda);
            assert!(!data.sealed, "{lambda:?} is already sealed");
            data.sealed = true;
        }
        let todos = std::mem::take(&mut self.lambda_data_mut(lambda).todos);
        for todo in todos {
            self.fix(lambda, todo);
        }
    }

    /// Write the value for `todo.handle` into every predecessor's argument
    /// slot for the param, then try to eliminate the param as a trivial phi.
    fn fix(&mut self, lambda: NodeId, todo: Todo) -> NodeId {
        assert!(self.is_sealed(lambda), "fix-up on an unsealed lambda");
        let param = self.param(lambda, todo.index);

        for pred in self.preds(lambda) {
            assert!(!self.is_body_empty(pred), "predecessor without a body");
            assert_eq!(self.succs(pred).len(), 1, "critical edge");

            if todo.index >= self.num_args(pred) {
                self.resize_ops(pred, todo.index + 2);
            }
            assert!(
                !self.ops(pred)[todo.index + 1].is_valid(),
                "argument slot already set"
            );
            let def = self.get_value(pred, todo.handle, todo.ty, &todo.name);
            self.set_op(pred, todo.index + 1, def);
        }

        self.try_remove_trivial_param(lambda, param)
    }

    /// A param is trivial if every incoming argument is either the param
    /// itself or one common value. Replace it with that value, write bottom
    /// into the now-dead argument slots, and retry on params of jump targets
    /// that received the forwarded value.
    pub fn try_remove_trivial_param(&mut self, lambda: NodeId, param: NodeId) -> NodeId {
        let resolved = self.deref(param);
        if resolved != param {
            return resolved;
        }
        assert_eq!(self.param_lambda(param), lambda);
        assert!(self.is_sealed(lambda), "trivial-phi check on an unsealed lambda");

        let index = self.param_index(param);
        let preds = self.preds(lambda);

        let mut same = None;
        for &pred in &preds {
            let Some(&slot) = self.ops(pred).get(index + 1) else {
                return param;
            };
            if !slot.is_valid() {
                return param;
            }
            let def = self.deref(slot);
            if def == param || Some(def) == same {
                continue;
            }
            if same.is_some() {
                return param; // two distinct incoming values: a real phi
            }
            same = Some(def);
        }
        let same = same.expect("phi param with only self-referencing arguments");

        let uses: Vec<Use> = self.uses(param).to_vec();
        self.replace(param, same);

        let bottom = self.bottom(self.ty(param));
        for &pred in &preds {
            self.update_op(pred, index + 1, bottom);
        }

        // the forwarded value may have made params of the jump targets trivial
        for u in uses {
            if u.index == 0 || !self.node(u.user).is_lambda() {
                continue;
            }
            for succ in self.direct_succs(u.user) {
                let pidx = u.index - 1;
                if pidx < self.num_params(succ) && self.is_sealed(succ) {
                    let candidate = self.param(succ, pidx);
                    if candidate != param {
                        self.try_remove_trivial_param(succ, candidate);
                    }
                }
            }
        }

        same
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::ir::node::{CmpOp, NodeOp, PrimOp};
    use crate::ir::world::World;

    const H: usize = 0;

    #[test]
    fn test_diamond_same_value_needs_no_param() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let pi_e = w.types_mut().pi1(i32t);
        let empty = w.types_mut().pi(&[]);

        let entry = w.lambda(pi_e, "entry");
        let then_bb = w.lambda(empty, "then");
        let else_bb = w.lambda(empty, "else");
        let merge = w.lambda(empty, "merge");

        let x = w.param(entry, 0);
        let zero = w.lit_i32(0);
        let cond = w.cmp(CmpOp::Eq, x, zero);
        w.branch(entry, cond, then_bb, else_bb);
        w.jump(then_bb, merge, &[]);
        w.jump(else_bb, merge, &[]);

        // both branches see the same value
        w.set_value(then_bb, H, x);
        w.set_value(else_bb, H, x);

        let v = w.get_value(merge, H, i32t, "v");
        assert_eq!(v, x);
        assert_eq!(w.num_params(merge), 0);
    }

    #[test]
    fn test_diamond_different_values_append_param() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let boolt = w.types_mut().bool_type();
        let pi_e = w.types_mut().pi1(boolt);
        let empty = w.types_mut().pi(&[]);

        let entry = w.lambda(pi_e, "entry");
        let then_bb = w.lambda(empty, "then");
        let else_bb = w.lambda(empty, "else");
        let merge = w.lambda(empty, "merge");

        w.branch(entry, w.param(entry, 0), then_bb, else_bb);
        w.jump(then_bb, merge, &[]);
        w.jump(else_bb, merge, &[]);

        let one = w.lit_i32(1);
        let two = w.lit_i32(2);
        w.set_value(then_bb, H, one);
        w.set_value(else_bb, H, two);

        let v = w.get_value(merge, H, i32t, "v");
        assert!(w.is_param(v));
        assert_eq!(w.num_params(merge), 1);

        // both jumps gained the matching argument
        assert_eq!(w.num_args(then_bb), 1);
        assert_eq!(w.num_args(else_bb), 1);
        assert_eq!(w.arg(then_bb, 0), one);
        assert_eq!(w.arg(else_bb, 0), two);
    }

    #[test]
    fn test_loop_invariant_phi_collapses() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let boolt = w.types_mut().bool_type();
        let empty = w.types_mut().pi(&[]);

        let entry = w.lambda(empty, "entry");
        let header = w.basicblock("header");
        let latch = w.lambda(empty, "latch");
        let exit = w.lambda(empty, "exit");

        let seven = w.lit_i32(7);
        w.set_value(entry, H, seven);
        w.jump(entry, header, &[]);

        let opaque = w.bottom(boolt);
        w.branch(header, opaque, latch, exit);
        w.jump(latch, header, &[]);

        // the back edge is still open, so reading appends a param
        let v = w.get_value(header, H, i32t, "v");
        assert!(w.is_param(v));
        assert_eq!(w.num_params(header), 1);

        w.seal(header);

        // the loop never redefines the slot, so the phi was trivial
        assert_eq!(w.deref(v), seven);
        assert_eq!(w.get_value(header, H, i32t, "v"), seven);
        // dead incoming slots hold bottom
        assert!(w.is_bottom(w.arg(entry, 0)));
        assert!(w.is_bottom(w.arg(latch, 0)));
    }

    #[test]
    fn test_undefined_read_yields_bottom() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let empty = w.types_mut().pi(&[]);
        let orphan = w.lambda(empty, "orphan");

        let v = w.get_value(orphan, H, i32t, "ghost");
        assert!(matches!(w.node(v).op, NodeOp::Prim(PrimOp::Bottom)));
        // the binding is cached
        assert_eq!(w.get_value(orphan, H, i32t, "ghost"), v);
    }

    #[test]
    #[should_panic(expected = "already sealed")]
    fn test_reseal_panics() {
        let mut w = World::new();
        let header = w.basicblock("header");
        w.seal(header);
        w.seal(header);
    }
}
