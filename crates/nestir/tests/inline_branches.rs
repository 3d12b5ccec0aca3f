use std::collections::HashMap;
use std::sync::Arc;

use nestir::exec::run_program;
use nestir::ir::ValueData;
use nestir::ops::Arith;
use nestir::passes::{eliminate, resolve_branches};
use nestir::{DType, ModuleId, Op, Program, TensorSpec, TensorValue};

fn f32s(values: &[f32]) -> TensorValue {
    TensorValue::from_f32([values.len()], values.to_vec()).unwrap()
}

fn count_ops(prog: &Program, name: &str) -> usize {
    prog.module_ids()
        .into_iter()
        .flat_map(|m| prog.body(m).to_vec())
        .filter(|id| prog.ins(*id).op().name() == name)
        .count()
}

fn literal_present(prog: &Program, needle: &TensorValue) -> bool {
    prog.module_ids()
        .into_iter()
        .flat_map(|m| prog.body(m).to_vec())
        .any(|id| matches!(prog.ins(id).op(), Op::Literal(v) if v == needle))
}

/// `if(cond) { A } { B }` followed by `tuple_get[0]`, with literal branch
/// bodies, built the way ingestion lays conditionals out.
fn literal_branch_program(cond: TensorValue, a: TensorValue, b: TensorValue) -> Program {
    let mut prog = Program::new("main");
    let main = prog.main();
    let cond = prog.add_literal(main, cond);
    branch_program_tail(&mut prog, main, cond, a, b);
    prog
}

fn branch_program_tail(
    prog: &mut Program,
    main: ModuleId,
    cond: nestir::InsId,
    a: TensorValue,
    b: TensorValue,
) {
    let then_m = prog.create_module("if0_then", Some(main));
    let va = prog.add_literal(then_m, a);
    prog.add_return(then_m, vec![va]).unwrap();
    let else_m = prog.create_module("if0_else", Some(main));
    let vb = prog.add_literal(else_m, b);
    prog.add_return(else_m, vec![vb]).unwrap();

    let if_id = prog
        .add_instruction(main, Op::If, vec![cond], vec![then_m, else_m])
        .unwrap();
    let out = prog
        .add_instruction(main, Op::TupleGet(0), vec![if_id], vec![])
        .unwrap();
    prog.add_return(main, vec![out]).unwrap();
}

#[test]
fn resolver_is_a_noop_without_conditionals() {
    let mut prog = Program::new("main");
    let main = prog.main();
    let a = prog.add_literal(main, f32s(&[1.0, 2.0]));
    let b = prog.add_literal(main, f32s(&[3.0, 4.0]));
    let sum = prog
        .add_instruction(main, Op::Compute(Arc::new(Arith::add())), vec![a, b], vec![])
        .unwrap();
    prog.add_return(main, vec![sum]).unwrap();

    let before = prog.to_string();
    assert!(!resolve_branches(&mut prog).unwrap());
    assert_eq!(prog.to_string(), before);
}

#[test]
fn resolved_true_selects_the_then_branch() {
    let a = f32s(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let b = f32s(&[5.0, 4.0, 3.0, 2.0, 1.0]);
    let mut prog = literal_branch_program(TensorValue::scalar_bool(true), a.clone(), b.clone());

    assert!(resolve_branches(&mut prog).unwrap());
    eliminate(&mut prog).unwrap();

    assert_eq!(prog.module_ids().len(), 1);
    assert_eq!(count_ops(&prog, "if"), 0);
    let outputs = prog.outputs(prog.main());
    assert_eq!(outputs.len(), 1);
    assert_eq!(prog.try_eval(outputs[0]), Some(a));
    assert!(!literal_present(&prog, &b));
}

#[test]
fn resolved_false_selects_the_else_branch() {
    let a = f32s(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let b = f32s(&[5.0, 4.0, 3.0, 2.0, 1.0]);
    let mut prog = literal_branch_program(TensorValue::scalar_bool(false), a.clone(), b.clone());

    assert!(resolve_branches(&mut prog).unwrap());
    eliminate(&mut prog).unwrap();

    assert_eq!(prog.module_ids().len(), 1);
    assert_eq!(count_ops(&prog, "if"), 0);
    let outputs = prog.outputs(prog.main());
    assert_eq!(prog.try_eval(outputs[0]), Some(b));
    assert!(!literal_present(&prog, &a));
}

#[test]
fn joint_constant_fold_selects_without_branching() {
    let a = f32s(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let b = f32s(&[5.0, 4.0, 3.0, 2.0, 1.0]);
    let mut prog = Program::new("main");
    let main = prog.main();
    let cond = prog
        .add_parameter(main, "cond", TensorSpec::scalar(DType::I1))
        .unwrap();
    branch_program_tail(&mut prog, main, cond, a.clone(), b.clone());

    assert!(resolve_branches(&mut prog).unwrap());
    eliminate(&mut prog).unwrap();

    assert_eq!(prog.module_ids().len(), 1);
    assert_eq!(count_ops(&prog, "if"), 0);
    assert_eq!(count_ops(&prog, "gather"), 1);

    let mut bindings = HashMap::new();
    bindings.insert(
        "cond".to_string(),
        TensorValue::from_bool([1], vec![true]).unwrap(),
    );
    assert_eq!(run_program(&prog, &bindings).unwrap(), vec![a]);

    bindings.insert(
        "cond".to_string(),
        TensorValue::from_bool([1], vec![false]).unwrap(),
    );
    assert_eq!(run_program(&prog, &bindings).unwrap(), vec![b]);
}

#[test]
fn non_foldable_conditional_is_left_untouched() {
    let mut prog = Program::new("main");
    let main = prog.main();
    let spec = TensorSpec::new(DType::F32, [2, 3]);
    let cond = prog
        .add_parameter(main, "cond", TensorSpec::scalar(DType::I1))
        .unwrap();
    let x = prog.add_parameter(main, "x", spec.clone()).unwrap();

    let ones = TensorValue::from_f32([2, 3], vec![1.0; 6]).unwrap();
    let twos = TensorValue::from_f32([2, 3], vec![2.0; 6]).unwrap();

    let then_m = prog.create_module("if0_then", Some(main));
    let l1 = prog.add_literal(then_m, ones);
    let r1 = prog
        .add_instruction(then_m, Op::Compute(Arc::new(Arith::add())), vec![x, l1], vec![])
        .unwrap();
    prog.add_return(then_m, vec![r1]).unwrap();

    let else_m = prog.create_module("if0_else", Some(main));
    let l2 = prog.add_literal(else_m, twos);
    let r2 = prog
        .add_instruction(else_m, Op::Compute(Arc::new(Arith::mul())), vec![x, l2], vec![])
        .unwrap();
    prog.add_return(else_m, vec![r2]).unwrap();

    let if_id = prog
        .add_instruction(main, Op::If, vec![cond], vec![then_m, else_m])
        .unwrap();
    let out = prog
        .add_instruction(main, Op::TupleGet(0), vec![if_id], vec![])
        .unwrap();
    prog.add_return(main, vec![out]).unwrap();

    let before = prog.to_string();
    assert!(!resolve_branches(&mut prog).unwrap());
    assert_eq!(prog.to_string(), before);
}

#[test]
fn nested_resolvable_conditionals_flatten_completely() {
    let mut prog = Program::new("main");
    let main = prog.main();

    let inner_then = prog.create_module("inner_then", None);
    let ten = prog.add_literal(inner_then, f32s(&[10.0]));
    prog.add_return(inner_then, vec![ten]).unwrap();
    let inner_else = prog.create_module("inner_else", None);
    let twenty = prog.add_literal(inner_else, f32s(&[20.0]));
    prog.add_return(inner_else, vec![twenty]).unwrap();

    let outer_then = prog.create_module("outer_then", Some(main));
    let inner_cond = prog.add_literal(outer_then, TensorValue::scalar_bool(true));
    let inner_if = prog
        .add_instruction(outer_then, Op::If, vec![inner_cond], vec![inner_then, inner_else])
        .unwrap();
    let inner_out = prog
        .add_instruction(outer_then, Op::TupleGet(0), vec![inner_if], vec![])
        .unwrap();
    prog.add_return(outer_then, vec![inner_out]).unwrap();

    let outer_else = prog.create_module("outer_else", Some(main));
    let thirty = prog.add_literal(outer_else, f32s(&[30.0]));
    prog.add_return(outer_else, vec![thirty]).unwrap();

    let cond = prog.add_literal(main, TensorValue::scalar_bool(true));
    let outer_if = prog
        .add_instruction(main, Op::If, vec![cond], vec![outer_then, outer_else])
        .unwrap();
    let out = prog
        .add_instruction(main, Op::TupleGet(0), vec![outer_if], vec![])
        .unwrap();
    prog.add_return(main, vec![out]).unwrap();

    assert!(resolve_branches(&mut prog).unwrap());
    eliminate(&mut prog).unwrap();

    assert_eq!(count_ops(&prog, "if"), 0);
    assert_eq!(prog.module_ids().len(), 1);
    let outputs = prog.outputs(prog.main());
    assert_eq!(prog.try_eval(outputs[0]), Some(f32s(&[10.0])));
}

#[test]
fn inlining_passes_external_operands_through_unchanged() {
    // The chosen branch consumes values produced in the enclosing module;
    // those operands are not in the remap and must survive as-is.
    let mut prog = Program::new("main");
    let main = prog.main();
    let spec = TensorSpec::new(DType::F32, [2, 3]);
    let x = prog.add_parameter(main, "x", spec.clone()).unwrap();
    let ones = prog.add_literal(main, TensorValue::from_f32([2, 3], vec![1.0; 6]).unwrap());
    let sm = prog
        .add_instruction(main, Op::Compute(Arc::new(Arith::add())), vec![ones, x], vec![])
        .unwrap();
    let y = prog.add_parameter(main, "y", spec.clone()).unwrap();

    let then_m = prog.create_module("if0_then", Some(main));
    let rt = prog
        .add_instruction(then_m, Op::Compute(Arc::new(Arith::add())), vec![x, sm], vec![])
        .unwrap();
    prog.add_outline(then_m, spec.clone());
    prog.add_return(then_m, vec![rt]).unwrap();

    let else_m = prog.create_module("if0_else", Some(main));
    let rand = prog.add_literal(
        else_m,
        TensorValue::from_f32([2, 3], vec![-1.3, -2.4, 0.9, 1.6, 0.8, -0.2]).unwrap(),
    );
    let re = prog
        .add_instruction(else_m, Op::Compute(Arc::new(Arith::mul())), vec![y, rand], vec![])
        .unwrap();
    prog.add_return(else_m, vec![re]).unwrap();

    let cond = prog.add_literal(main, TensorValue::scalar_bool(true));
    let if_id = prog
        .add_instruction(main, Op::If, vec![cond], vec![then_m, else_m])
        .unwrap();
    let out = prog
        .add_instruction(main, Op::TupleGet(0), vec![if_id], vec![])
        .unwrap();
    prog.add_return(main, vec![out]).unwrap();

    assert!(resolve_branches(&mut prog).unwrap());
    eliminate(&mut prog).unwrap();

    assert_eq!(prog.module_ids().len(), 1);
    assert_eq!(count_ops(&prog, "if"), 0);

    // x + (1 + x) for an all-twos input is 5 everywhere.
    let mut bindings = HashMap::new();
    bindings.insert(
        "x".to_string(),
        TensorValue::from_f32([2, 3], vec![2.0; 6]).unwrap(),
    );
    bindings.insert(
        "y".to_string(),
        TensorValue::from_f32([2, 3], vec![0.0; 6]).unwrap(),
    );
    let outputs = run_program(&prog, &bindings).unwrap();
    match outputs[0].data() {
        ValueData::F32(values) => assert_eq!(values, &vec![5.0; 6]),
        other => panic!("unexpected output payload {other:?}"),
    }
}
