//! Lowering to continuation-passing first-order form.
//!
//! A call site is "bad" when it jumps a higher-order or non-local
//! continuation. The driver walks every top-level scope in forward
//! postorder, specializing bad targets by dropping exactly the higher-order
//! argument positions through the mangler. Specializations are cached on
//! the call signature, so repeated calls share one clone.
//!
//! Two modes run to a fixed point: the local phase only specializes targets
//! inside the current scope; once quiescent, the global phase also attacks
//! top-level targets that neither return nor belong to the scope boundary.
//! The pass finishes with a graph cleanup and a structural verification.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::scope::Scope;
use crate::analysis::verify::debug_verify;
use crate::ir::node::NodeId;
use crate::ir::types::GenericMap;
use crate::ir::world::World;
use crate::transform::mangle::mangle;

/// Signature of a specialized call: the target, then one entry per argument
/// — `Some(value)` for the dropped (higher-order) positions, `None` for the
/// positions that stay params.
type CallSig = Vec<Option<NodeId>>;

/// Lower all indirect and higher-order calls until the program is in
/// continuation-passing first-order form.
pub fn lower2cff(world: &mut World) {
    let mut cache: FxHashMap<CallSig, NodeId> = FxHashMap::default();
    let mut top: FxHashSet<NodeId> = FxHashSet::default();

    let mut local = true;
    let mut todo = true;
    while todo || local {
        todo = false;

        Scope::for_each(world, |world, scope| {
            // forward postorder of the scope's control flow
            for i in (0..scope.rpo().len()).rev() {
                let lambda = scope.rpo()[i];
                let Some(to) = world.as_lambda(world.to(lambda)) else {
                    continue;
                };
                if !is_bad(world, &scope, &top, local, to) {
                    continue;
                }

                debug!("bad: {}", world.unique_name(to));
                todo = true;

                let mut generics = GenericMap::default();
                infer_call(world, &mut generics, lambda, to);

                // keep first-order args as params, drop the rest in place
                let num_args = world.num_args(lambda);
                let mut sig: CallSig = Vec::with_capacity(num_args + 1);
                sig.push(Some(to));
                for a in 0..num_args {
                    let higher_order = world.order(world.param(to, a)) > 0;
                    sig.push(higher_order.then(|| world.arg(lambda, a)));
                }

                let target = match cache.get(&sig) {
                    Some(&target) => target,
                    None => {
                        let mut to_drop = Vec::new();
                        let mut drop_with = Vec::new();
                        for (a, slot) in sig[1..].iter().enumerate() {
                            if let Some(value) = slot {
                                to_drop.push(a);
                                drop_with.push(*value);
                            }
                        }
                        let to_scope = Scope::new(world, to);
                        let target =
                            mangle(world, &to_scope, &to_drop, &drop_with, &[], &generics);
                        cache.insert(sig, target);
                        target
                    }
                };

                let nargs: Vec<NodeId> = (0..num_args)
                    .filter(|&a| world.order(world.param(to, a)) == 0)
                    .map(|a| world.arg(lambda, a))
                    .collect();
                world.jump(lambda, target, &nargs);
            }
            top.insert(scope.entries()[0]);
        });

        if !todo && local {
            debug!("switching to global mode");
            local = false;
            todo = true;
        }
    }

    world.cleanup();
    verify_first_order(world);
    debug_verify(world);
}

/// Local mode: bad targets are non-basic-block members of the scope body.
/// Global mode: previously seen top entries are bad unless they return or
/// sit on the scope boundary; everything else is bad unless it is a basic
/// block.
fn is_bad(world: &World, scope: &Scope, top: &FxHashSet<NodeId>, local: bool, to: NodeId) -> bool {
    if world.is_body_empty(to) {
        return false;
    }
    if local {
        scope.inner_contains(to) && !world.is_basicblock(to)
    } else if top.contains(&to) {
        !world.is_returning(to) && !scope.outer_contains(to)
    } else {
        !world.is_basicblock(to)
    }
}

/// Bind the target's generics against the concrete argument types at the
/// call site.
fn infer_call(world: &World, generics: &mut GenericMap, lambda: NodeId, to: NodeId) {
    let Some(elems) = world.types().pi_elems(world.ty(to)) else {
        return;
    };
    let args = world.args(lambda);
    debug_assert_eq!(elems.len(), args.len(), "specializing an unbalanced call");
    for (&param_ty, &arg) in elems.iter().zip(args.iter()) {
        let inferred = world.types().infer_with(generics, param_ty, world.ty(arg));
        debug_assert!(inferred, "call argument types do not unify");
    }
}

/// After lowering, no operand may be a higher-order param of a scope-body
/// member.
fn verify_first_order(world: &mut World) {
    if cfg!(debug_assertions) {
        Scope::for_each(world, |world, scope| {
            for &lambda in scope.rpo() {
                for &op in world.ops(lambda) {
                    if op.is_valid() && world.is_param(op) {
                        let owner = world.param_lambda(world.deref(op));
                        debug_assert!(
                            world.order(op) == 0 || !scope.inner_contains(owner),
                            "higher-order param {} escapes the lowering",
                            world.unique_name(op)
                        );
                    }
                }
            }
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
