//! Structural call-site verification.
//!
//! Every non-empty lambda must jump to something callable, with an argument
//! list matching the target signature's arity. Argument types are checked
//! whenever neither side mentions generics; generic call sites are checked
//! by arity alone.

use crate::ir::node::NodeId;
use crate::ir::world::World;

/// Check every call site in the world; the `Err` carries a detailed dump.
pub fn verify(world: &World) -> Result<(), String> {
    for &lambda in world.lambdas() {
        if world.is_body_empty(lambda) {
            continue;
        }
        verify_call(world, lambda)?;
    }
    Ok(())
}

fn verify_call(world: &World, lambda: NodeId) -> Result<(), String> {
    let to = world.to(lambda);
    if !to.is_valid() {
        return Err(format!(
            "'{}' has arguments but no jump target",
            world.unique_name(lambda)
        ));
    }

    let to_ty = world.ty(to);
    let Some(elems) = world.types().pi_elems(to_ty) else {
        return Err(format!(
            "call target of '{}' is not callable: {}",
            world.unique_name(lambda),
            world.types().display(to_ty)
        ));
    };
    let elems = elems.to_vec();

    if elems.len() != world.num_args(lambda) {
        return Err(format!(
            "argument/parameter mismatch in '{}':\n  target '{}' of type {} expects {} arguments, jump passes {}",
            world.unique_name(lambda),
            world.unique_name(to),
            world.types().display(to_ty),
            elems.len(),
            world.num_args(lambda),
        ));
    }

    for (i, &arg) in world.args(lambda).iter().enumerate() {
        if !arg.is_valid() {
            return Err(format!(
                "argument {i} of '{}' is unset",
                world.unique_name(lambda)
            ));
        }
        let arg_ty = world.ty(arg);
        let param_ty = elems[i];
        if param_ty != arg_ty
            && !world.types().mentions_generic(param_ty)
            && !world.types().mentions_generic(arg_ty)
        {
            return Err(format!(
                "argument {i} of '{}' has type {} but target '{}' expects {}",
                world.unique_name(lambda),
                world.types().display(arg_ty),
                world.unique_name(to),
                world.types().display(param_ty),
            ));
        }
    }

    Ok(())
}

/// Abort on a broken graph; transforms run this after rewriting.
pub fn debug_verify(world: &World) {
    if let Err(msg) = verify(world) {
        panic!("ir verification failed:\n{msg}");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_world_verifies() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let pi_i = w.types_mut().pi1(i32t);
        let empty = w.types_mut().pi(&[]);

        let f = w.lambda(empty, "f");
        let g = w.lambda(pi_i, "g");
        let seven = w.lit_i32(7);
        w.jump(f, g, &[seven]);

        assert!(verify(&w).is_ok());
    }

    #[test]
    fn test_arity_mismatch_is_reported() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let pi_i = w.types_mut().pi1(i32t);
        let empty = w.types_mut().pi(&[]);

        let f = w.lambda(empty, "f");
        let g = w.lambda(pi_i, "g");
        w.jump(f, g, &[]);

        let err = verify(&w).unwrap_err();
        assert!(err.contains("argument/parameter mismatch"));
    }

    #[test]
    fn test_argument_type_mismatch_is_reported() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let pi_i = w.types_mut().pi1(i32t);
        let empty = w.types_mut().pi(&[]);

        let f = w.lambda(empty, "f");
        let g = w.lambda(pi_i, "g");
        let wrong = w.lit_bool(true);
        w.jump(f, g, &[wrong]);

        let err = verify(&w).unwrap_err();
        assert!(err.contains("expects i32"));
    }

    #[test]
    fn test_generic_call_sites_check_arity_only() {
        let mut w = World::new();
        let g0 = w.types_mut().generic(0);
        let pi_g = w.types_mut().pi1(g0);
        let empty = w.types_mut().pi(&[]);

        let f = w.lambda(empty, "f");
        let poly = w.lambda(pi_g, "poly");
        let seven = w.lit_i32(7);
        w.jump(f, poly, &[seven]);

        assert!(verify(&w).is_ok());
    }
}
