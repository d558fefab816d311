//! End-to-end mangler scenarios driven through the public API.

use skein::{verify, ArithOp, CmpOp, GenericMap, NodeId, Scope, World};

/// countdown(n, step, ret):
///   if n == 0 then done() else step()
///   done:  ret(n)
///   step:  countdown(n - step, step, ret)
fn countdown(w: &mut World) -> NodeId {
    let i32t = w.types_mut().i32_type();
    let ret_pi = w.types_mut().pi1(i32t);
    let r_pi = w.types_mut().pi(&[i32t, i32t, ret_pi]);
    let empty = w.types_mut().pi(&[]);

    let r = w.lambda(r_pi, "countdown");
    let done = w.lambda(empty, "done");
    let step_bb = w.lambda(empty, "step");

    let n = w.param(r, 0);
    let step = w.param(r, 1);
    let ret = w.param(r, 2);
    let zero = w.lit_i32(0);
    let cond = w.cmp(CmpOp::Eq, n, zero);
    w.branch(r, cond, done, step_bb);
    w.jump(done, ret, &[n]);
    let next = w.arith(ArithOp::Sub, n, step);
    w.jump(step_bb, r, &[next, step, ret]);
    r
}

#[test]
fn clone_keeps_the_original_intact() {
    let mut w = World::new();
    let r = countdown(&mut w);
    let scope = Scope::new(&w, r);

    let clone = scope.clone_scope(&mut w, &GenericMap::default());

    assert_ne!(clone, r);
    assert_eq!(w.ty(clone), w.ty(r));
    assert_eq!(w.num_params(clone), 3);
    // both versions verify independently
    assert!(verify(&w).is_ok());
    // the original still tail-calls itself
    let original_loop = w
        .succs(r)
        .into_iter()
        .find(|&s| w.to(s) == r)
        .expect("original self call intact");
    assert_eq!(w.num_args(original_loop), 3);
}

#[test]
fn dropping_an_invariant_param_rewrites_the_tail_call() {
    let mut w = World::new();
    let r = countdown(&mut w);
    let scope = Scope::new(&w, r);

    let one = w.lit_i32(1);
    let spec = scope.drop_with(&mut w, &[1], &[one], &GenericMap::default());

    // step was dropped: n and ret remain
    assert_eq!(w.num_params(spec), 2);

    // the recursive jump targets the specialized entry, not the original,
    // and passes only the remaining positions
    let loop_clone = w
        .succs(spec)
        .into_iter()
        .find(|&s| w.to(s) == spec)
        .expect("self tail call retargeted at the specialization");
    assert_eq!(w.num_args(loop_clone), 2);
    assert_eq!(w.arg(loop_clone, 1), w.param(spec, 1));

    // no clone jumps back into the original entry
    for s in w.succs(spec) {
        assert_ne!(w.to(s), r);
    }
    assert!(verify(&w).is_ok());
}

#[test]
fn dropping_all_params_folds_the_condition() {
    let mut w = World::new();
    let r = countdown(&mut w);
    let scope = Scope::new(&w, r);

    // a sink for the result so the drop is fully first-order
    let i32t = w.types_mut().i32_type();
    let ret_pi = w.types_mut().pi1(i32t);
    let sink = w.lambda(ret_pi, "sink");

    let zero = w.lit_i32(0);
    let five = w.lit_i32(5);
    let spec = scope.drop_params(&mut w, &[zero, five, sink]);

    // n == 0 folded the branch: the body jumps the done clone directly,
    // which returns 0 to the sink
    assert_eq!(w.num_params(spec), 0);
    let done_clone = w.to(spec);
    assert_eq!(w.to(done_clone), sink);
    assert_eq!(w.arg(done_clone, 0), zero);
    assert!(verify(&w).is_ok());
}

#[test]
fn lifting_a_free_value_appends_a_param_of_its_type() {
    let mut w = World::new();
    let i32t = w.types_mut().i32_type();
    let ret_pi = w.types_mut().pi1(i32t);
    let f_pi = w.types_mut().pi1(ret_pi);

    let f = w.lambda(f_pi, "f");
    let seven = w.lit_i32(7);
    w.jump(f, w.param(f, 0), &[seven]);

    let scope = Scope::new(&w, f);
    let lifted = scope.lift(&mut w, &[seven], &GenericMap::default());

    assert_eq!(w.num_params(lifted), 2);
    assert_eq!(w.ty(w.param(lifted, 1)), w.ty(seven));
    // the free constant became the trailing param in the clone's body
    assert_eq!(w.arg(lifted, 0), w.param(lifted, 1));
    // the original is untouched
    assert_eq!(w.arg(f, 0), seven);
    assert!(verify(&w).is_ok());
}

#[test]
fn sealed_merge_with_agreeing_branches_needs_no_phi_param() {
    let mut w = World::new();
    let i32t = w.types_mut().i32_type();
    let boolt = w.types_mut().bool_type();
    let ret_pi = w.types_mut().pi1(i32t);
    let entry_pi = w.types_mut().pi2(boolt, ret_pi);
    let empty = w.types_mut().pi(&[]);

    let entry = w.lambda(entry_pi, "entry");
    let then_bb = w.lambda(empty, "then");
    let else_bb = w.lambda(empty, "else");
    let merge = w.lambda(empty, "merge");

    w.branch(entry, w.param(entry, 0), then_bb, else_bb);
    w.jump(then_bb, merge, &[]);
    w.jump(else_bb, merge, &[]);

    // both branches define the slot to the same value
    let h = 0;
    let seven = w.lit_i32(7);
    w.set_value(then_bb, h, seven);
    w.set_value(else_bb, h, seven);

    let v = w.get_value(merge, h, i32t, "v");
    assert_eq!(v, seven);
    // the would-be phi param was never introduced
    assert_eq!(w.num_params(merge), 0);

    w.jump(merge, w.param(entry, 1), &[v]);
    assert!(verify(&w).is_ok());
}
