//! The mangler: specialization by cloning.
//!
//! Given a single-entry scope, produce a fresh entry whose signature is the
//! original minus the dropped positions (each replaced by a supplied value)
//! plus one trailing param per lifted free value, with generics resolved
//! through the substitution map. Scope members touched along the way are
//! cloned as stubs and their bodies rewritten; conditional jumps over
//! literal conditions fold; self tail calls whose dropped slots carry the
//! very drop values are retargeted at the new entry, keeping the
//! specialization closed under recursion.
//!
//! The old-to-new mapping is an explicit map scoped to one mangling, so
//! concurrent scopes never share scratch state.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::scope::Scope;
use crate::ir::node::{Lit, NodeId, NodeOp, PrimOp};
use crate::ir::types::{GenericMap, TypeId};
use crate::ir::world::World;

/// Specialize `scope` by dropping `to_drop` (sorted indices into the entry's
/// params, replaced by `drop_with`) and lifting `to_lift` into new trailing
/// params. Returns the new entry.
pub fn mangle(
    world: &mut World,
    scope: &Scope,
    to_drop: &[usize],
    drop_with: &[NodeId],
    to_lift: &[NodeId],
    generics: &GenericMap,
) -> NodeId {
    assert_eq!(
        scope.num_entries(),
        1,
        "mangling requires a single-entry scope"
    );
    assert_eq!(to_drop.len(), drop_with.len());
    debug_assert!(
        to_drop.windows(2).all(|w| w[0] < w[1]),
        "drop indices must be sorted"
    );

    let oentry = scope.entries()[0];
    let mut mangler = Mangler {
        world,
        scope,
        to_drop,
        drop_with,
        to_lift,
        generics,
        old2new: FxHashMap::default(),
        oentry,
        nentry: NodeId::INVALID,
    };
    mangler.run()
}

struct Mangler<'a> {
    world: &'a mut World,
    scope: &'a Scope,
    to_drop: &'a [usize],
    drop_with: &'a [NodeId],
    to_lift: &'a [NodeId],
    generics: &'a GenericMap,
    old2new: FxHashMap<NodeId, NodeId>,
    oentry: NodeId,
    nentry: NodeId,
}

impl<'a> Mangler<'a> {
    fn run(&mut self) -> NodeId {
        let oentry = self.oentry;
        let o_elems: Vec<TypeId> = self
            .world
            .types()
            .pi_elems(self.world.ty(oentry))
            .expect("entry signature must be a pi type")
            .to_vec();

        // new signature: original elems minus dropped, plus lifted types
        let mut nelems: Vec<TypeId> = Vec::with_capacity(o_elems.len());
        for (i, &elem) in o_elems.iter().enumerate() {
            if !self.to_drop.contains(&i) {
                nelems.push(elem);
            }
        }
        let offset = nelems.len();
        for &lifted in self.to_lift {
            nelems.push(self.world.ty(self.world.deref(lifted)));
        }
        let n_pi = self.world.types_mut().pi(&nelems);
        let n_pi = self.world.types_mut().specialize(n_pi, self.generics);
        let name = self.world.name(oentry).to_string();
        let attr = self.world.attr(oentry);
        let nentry = self.world.lambda_attr(n_pi, attr, &name);
        self.nentry = nentry;

        // entry params: dropped positions map to their replacement values,
        // kept positions to the corresponding new param
        let mut np = 0;
        let mut d = 0;
        for i in 0..o_elems.len() {
            let oparam = self.world.param(oentry, i);
            if d < self.to_drop.len() && self.to_drop[d] == i {
                let with = self.world.deref(self.drop_with[d]);
                self.old2new.insert(oparam, with);
                d += 1;
            } else {
                let nparam = self.world.param(nentry, np);
                np += 1;
                let pname = self.world.name(oparam).to_string();
                self.world.set_name(nparam, &pname);
                self.old2new.insert(oparam, nparam);
            }
        }
        for (x, &lifted) in self.to_lift.iter().enumerate() {
            let lifted = self.world.deref(lifted);
            let nparam = self.world.param(nentry, offset + x);
            let lname = self.world.name(lifted).to_string();
            self.world.set_name(nparam, &lname);
            self.old2new.insert(lifted, nparam);
        }

        // the old entry maps to itself so self tail calls stay recognizable
        self.old2new.insert(oentry, oentry);
        self.mangle_body(oentry, nentry);

        // rewrite the bodies of all stubs cloned along the way; a body
        // rewrite may clone further members, so iterate until quiescent
        let mut done: FxHashSet<NodeId> = FxHashSet::default();
        loop {
            let mut progress = false;
            for i in 1..self.scope.rpo().len() {
                let cur = self.scope.rpo()[i];
                if done.contains(&cur) {
                    continue;
                }
                if let Some(&ncur) = self.old2new.get(&cur) {
                    self.mangle_body(cur, ncur);
                    done.insert(cur);
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }

        nentry
    }

    fn mangle_body(&mut self, olambda: NodeId, nlambda: NodeId) {
        let osize = self.world.ops(olambda).len();
        if osize == 0 {
            return;
        }

        let mut nops: Vec<NodeId> = vec![NodeId::INVALID; osize];
        for i in 1..osize {
            let oarg = self.world.op(olambda, i);
            nops[i] = self.mangle_def(oarg);
        }

        // fold the jump when the target is a select over a literal condition
        let oto = self.world.deref(self.world.op(olambda, 0));
        nops[0] = if matches!(self.world.node(oto).op, NodeOp::Prim(PrimOp::Select)) {
            let ocond = self.world.op(oto, 0);
            let otval = self.world.op(oto, 1);
            let ofval = self.world.op(oto, 2);
            let ncond = self.mangle_def(ocond);
            if let Some(Lit::Bool(flag)) = self.world.as_lit(ncond) {
                self.mangle_def(if flag { otval } else { ofval })
            } else {
                let ntval = self.mangle_def(otval);
                let nfval = self.mangle_def(ofval);
                self.world.select(ncond, ntval, nfval)
            }
        } else {
            self.mangle_def(oto)
        };

        let ntarget = nops[0];
        if ntarget == self.oentry {
            // self tail call: when every dropped slot carries its drop value,
            // excise those slots and jump the new entry instead
            let substitute = self
                .to_drop
                .iter()
                .zip(self.drop_with.iter())
                .all(|(&d, &v)| self.world.deref(nops[d + 1]) == self.world.deref(v));
            if substitute {
                let nargs: Vec<NodeId> = (1..osize)
                    .filter(|&i| !self.to_drop.contains(&(i - 1)))
                    .map(|i| nops[i])
                    .collect();
                self.world.jump(nlambda, self.nentry, &nargs);
                return;
            }
        }

        self.world.jump(nlambda, ntarget, &nops[1..]);
    }

    fn mangle_def(&mut self, odef: NodeId) -> NodeId {
        let odef = self.world.deref(odef);
        if let Some(&ndef) = self.old2new.get(&odef) {
            return ndef;
        }

        if self.world.node(odef).is_lambda() {
            if self.scope.contains(odef) {
                return self.mangle_head(odef);
            }
            // free lambdas pass through unchanged
            self.old2new.insert(odef, odef);
            return odef;
        }
        if self.world.node(odef).is_param() {
            // params of out-of-scope lambdas pass through unchanged
            self.old2new.insert(odef, odef);
            return odef;
        }

        let ops: Vec<NodeId> = self.world.ops(odef).to_vec();
        let mut nops = Vec::with_capacity(ops.len());
        let mut changed = false;
        for op in ops {
            let nop = self.mangle_def(op);
            changed |= nop != op;
            nops.push(nop);
        }
        let ndef = if changed {
            self.world.rebuild(odef, &nops)
        } else {
            odef
        };
        self.old2new.insert(odef, ndef);
        ndef
    }

    /// Clone a scope member's head: same signature under the generic map,
    /// fresh params.
    fn mangle_head(&mut self, olambda: NodeId) -> NodeId {
        debug_assert!(!self.old2new.contains_key(&olambda));
        let name = self.world.name(olambda).to_string();
        let nlambda = self.world.stub(olambda, self.generics, &name);
        self.old2new.insert(olambda, nlambda);
        for i in 0..self.world.num_params(olambda) {
            let oparam = self.world.param(olambda, i);
            let nparam = self.world.param(nlambda, i);
            self.old2new.insert(oparam, nparam);
        }
        nlambda
    }
}

// =============================================================================
// Scope convenience wrappers
// =============================================================================

impl Scope {
    /// Clone the scope; with an empty generic map this is the identity
    /// mangling.
    pub fn clone_scope(&self, world: &mut World, generics: &GenericMap) -> NodeId {
        mangle(world, self, &[], &[], &[], generics)
    }

    /// Drop the first `drop_with.len()` entry params, substituting the given
    /// values.
    pub fn drop_params(&self, world: &mut World, drop_with: &[NodeId]) -> NodeId {
        let to_drop: Vec<usize> = (0..drop_with.len()).collect();
        mangle(world, self, &to_drop, drop_with, &[], &GenericMap::default())
    }

    /// Drop the given entry-param positions, substituting the given values.
    pub fn drop_with(
        &self,
        world: &mut World,
        to_drop: &[usize],
        drop_with: &[NodeId],
        generics: &GenericMap,
    ) -> NodeId {
        mangle(world, self, to_drop, drop_with, &[], generics)
    }

    /// Hoist free values into new trailing entry params.
    pub fn lift(&self, world: &mut World, to_lift: &[NodeId], generics: &GenericMap) -> NodeId {
        mangle(world, self, &[], &[], to_lift, generics)
    }

    pub fn mangle(
        &self,
        world: &mut World,
        to_drop: &[usize],
        drop_with: &[NodeId],
        to_lift: &[NodeId],
        generics: &GenericMap,
    ) -> NodeId {
        mangle(world, self, to_drop, drop_with, to_lift, generics)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::ArithOp;

    /// f(x, ret) { ret(x + 1) }
    fn increment_fn(w: &mut World) -> NodeId {
        let i32t = w.types_mut().i32_type();
        let ret_pi = w.types_mut().pi1(i32t);
        let f_pi = w.types_mut().pi2(i32t, ret_pi);
        let f = w.lambda(f_pi, "f");
        let one = w.lit_i32(1);
        let sum = w.arith(ArithOp::Add, w.param(f, 0), one);
        w.jump(f, w.param(f, 1), &[sum]);
        f
    }

    #[test]
    fn test_clone_is_isomorphic_and_fresh() {
        let mut w = World::new();
        let f = increment_fn(&mut w);
        let scope = Scope::new(&w, f);

        let f2 = scope.clone_scope(&mut w, &GenericMap::default());
        assert_ne!(f2, f);
        assert_eq!(w.ty(f2), w.ty(f));
        assert_eq!(w.num_params(f2), 2);
        // the clone's body reads its own params, not the original's
        assert_eq!(w.to(f2), w.param(f2, 1));
        let sum = w.arg(f2, 0);
        assert_eq!(w.op(sum, 0), w.param(f2, 0));
    }

    #[test]
    fn test_empty_mangle_equals_clone() {
        let mut w = World::new();
        let f = increment_fn(&mut w);
        let scope = Scope::new(&w, f);

        let a = scope.mangle(&mut w, &[], &[], &[], &GenericMap::default());
        assert_eq!(w.ty(a), w.ty(f));
        assert_eq!(w.num_params(a), w.num_params(f));
    }

    #[test]
    fn test_trivial_drop_constant_folds() {
        let mut w = World::new();
        let f = increment_fn(&mut w);
        let scope = Scope::new(&w, f);

        let forty_two = w.lit_i32(42);
        let f42 = scope.drop_params(&mut w, &[forty_two]);

        // one param dropped, the return continuation remains
        assert_eq!(w.num_params(f42), 1);
        assert_eq!(w.to(f42), w.param(f42, 0));
        // the body rebuilt 42 + 1 into the literal 43
        let forty_three = w.lit_i32(43);
        assert_eq!(w.arg(f42, 0), forty_three);
    }

    #[test]
    fn test_lift_introduces_trailing_param() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let ret_pi = w.types_mut().pi1(i32t);
        let f_pi = w.types_mut().pi1(ret_pi);
        let f = w.lambda(f_pi, "f");
        let seven = w.lit_i32(7);
        let one = w.lit_i32(1);
        let sum = w.arith(ArithOp::Add, seven, one); // folds to 8
        let c = w.arith(ArithOp::Mul, sum, sum); // 64, a free constant
        w.jump(f, w.param(f, 0), &[c]);
        let scope = Scope::new(&w, f);

        let lifted = scope.lift(&mut w, &[c], &GenericMap::default());
        assert_eq!(w.num_params(lifted), 2);
        // the trailing param has the lifted value's type and replaces it
        assert_eq!(w.ty(w.param(lifted, 1)), w.ty(c));
        assert_eq!(w.arg(lifted, 0), w.param(lifted, 1));
        // the original body is untouched
        assert_eq!(w.arg(f, 0), c);
    }
}
