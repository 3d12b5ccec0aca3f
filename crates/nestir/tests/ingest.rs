use std::collections::{BTreeMap, HashMap};

use nestir::exec::run_program;
use nestir::ingest::{AttrDoc, GraphDoc, GraphLoader, InitDoc, IoDoc, NodeDoc};
use nestir::ir::ValueData;
use nestir::{DType, GraphError, Program, TensorValue};

fn io(name: &str, dtype: DType, dims: &[usize]) -> IoDoc {
    IoDoc {
        name: name.to_string(),
        dtype,
        dims: dims.to_vec(),
    }
}

fn init(name: &str, value: TensorValue) -> InitDoc {
    InitDoc {
        name: name.to_string(),
        value,
    }
}

fn node(name: &str, op: &str, inputs: &[&str], outputs: &[&str]) -> NodeDoc {
    NodeDoc {
        name: name.to_string(),
        op: op.to_string(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        attrs: BTreeMap::new(),
    }
}

fn if_node(name: &str, cond: &str, output: &str, then_doc: GraphDoc, else_doc: GraphDoc) -> NodeDoc {
    let mut n = node(name, "If", &[cond], &[output]);
    n.attrs
        .insert("then_branch".to_string(), AttrDoc::Graph(then_doc));
    n.attrs
        .insert("else_branch".to_string(), AttrDoc::Graph(else_doc));
    n
}

/// Branch subgraphs referencing `x` from the outer scope: then computes
/// `x + 1`, else computes `x * 2`.
fn branch_docs() -> (GraphDoc, GraphDoc) {
    let then_doc = GraphDoc {
        name: "then_graph".to_string(),
        inputs: vec![],
        initializers: vec![init(
            "one",
            TensorValue::from_f32([3], vec![1.0; 3]).unwrap(),
        )],
        nodes: vec![node("then_add", "add", &["x", "one"], &["t"])],
        outputs: vec!["t".to_string()],
    };
    let else_doc = GraphDoc {
        name: "else_graph".to_string(),
        inputs: vec![],
        initializers: vec![init(
            "two",
            TensorValue::from_f32([3], vec![2.0; 3]).unwrap(),
        )],
        nodes: vec![node("else_mul", "mul", &["x", "two"], &["e"])],
        outputs: vec!["e".to_string()],
    };
    (then_doc, else_doc)
}

fn count_ops(prog: &Program, name: &str) -> usize {
    prog.module_ids()
        .into_iter()
        .flat_map(|m| prog.body(m).to_vec())
        .filter(|id| prog.ins(*id).op().name() == name)
        .count()
}

#[test]
fn constant_condition_parses_only_the_selected_branch() {
    let (then_doc, else_doc) = branch_docs();
    let doc = GraphDoc {
        name: "model".to_string(),
        inputs: vec![io("x", DType::F32, &[3])],
        initializers: vec![init("cond", TensorValue::scalar_bool(true))],
        nodes: vec![if_node("if0", "cond", "r", then_doc, else_doc)],
        outputs: vec!["r".to_string()],
    };

    let prog = GraphLoader::default().load(&doc).unwrap();
    assert_eq!(prog.module_ids().len(), 1);
    assert_eq!(count_ops(&prog, "if"), 0);
    assert_eq!(count_ops(&prog, "add"), 1);
    assert_eq!(count_ops(&prog, "mul"), 0, "the else branch is never parsed");

    let mut bindings = HashMap::new();
    bindings.insert(
        "x".to_string(),
        TensorValue::from_f32([3], vec![1.0, 2.0, 3.0]).unwrap(),
    );
    let outputs = run_program(&prog, &bindings).unwrap();
    match outputs[0].data() {
        ValueData::F32(values) => assert_eq!(values, &[2.0, 3.0, 4.0]),
        other => panic!("unexpected output payload {other:?}"),
    }
}

#[test]
fn constant_false_condition_selects_the_else_branch() {
    let (then_doc, else_doc) = branch_docs();
    let doc = GraphDoc {
        name: "model".to_string(),
        inputs: vec![io("x", DType::F32, &[3])],
        initializers: vec![init("cond", TensorValue::scalar_bool(false))],
        nodes: vec![if_node("if0", "cond", "r", then_doc, else_doc)],
        outputs: vec!["r".to_string()],
    };

    let prog = GraphLoader::default().load(&doc).unwrap();
    assert_eq!(count_ops(&prog, "add"), 0, "the then branch is never parsed");
    assert_eq!(count_ops(&prog, "mul"), 1);
}

#[test]
fn multi_element_condition_is_a_parse_error() {
    let (then_doc, else_doc) = branch_docs();
    let doc = GraphDoc {
        name: "model".to_string(),
        inputs: vec![io("x", DType::F32, &[3])],
        initializers: vec![init(
            "cond",
            TensorValue::from_bool([2], vec![true, false]).unwrap(),
        )],
        nodes: vec![if_node("if0", "cond", "r", then_doc, else_doc)],
        outputs: vec!["r".to_string()],
    };

    let err = GraphLoader::default().load(&doc).unwrap_err();
    assert!(matches!(err, GraphError::Parse(_)), "got {err}");
}

#[test]
fn runtime_condition_builds_child_modules() {
    let (then_doc, else_doc) = branch_docs();
    let doc = GraphDoc {
        name: "model".to_string(),
        inputs: vec![io("cond", DType::I1, &[1]), io("x", DType::F32, &[3])],
        initializers: vec![],
        nodes: vec![if_node("if0", "cond", "r", then_doc, else_doc)],
        outputs: vec!["r".to_string()],
    };

    let prog = GraphLoader::default().load(&doc).unwrap();
    assert_eq!(prog.module_ids().len(), 3);
    assert_eq!(count_ops(&prog, "if"), 1);
    assert_eq!(count_ops(&prog, "tuple_get"), 1);
    for m in prog.module_ids() {
        if m != prog.main() {
            assert_eq!(prog.module(m).parent(), Some(prog.main()));
        }
    }
}

#[test]
fn branch_output_shape_mismatch_is_a_parse_error() {
    let then_doc = GraphDoc {
        name: "then_graph".to_string(),
        inputs: vec![],
        initializers: vec![init(
            "a",
            TensorValue::from_f32([2], vec![1.0, 2.0]).unwrap(),
        )],
        nodes: vec![],
        outputs: vec!["a".to_string()],
    };
    let else_doc = GraphDoc {
        name: "else_graph".to_string(),
        inputs: vec![],
        initializers: vec![init(
            "b",
            TensorValue::from_f32([3], vec![1.0, 2.0, 3.0]).unwrap(),
        )],
        nodes: vec![],
        outputs: vec!["b".to_string()],
    };
    let doc = GraphDoc {
        name: "model".to_string(),
        inputs: vec![io("cond", DType::I1, &[1])],
        initializers: vec![],
        nodes: vec![if_node("if0", "cond", "r", then_doc, else_doc)],
        outputs: vec!["r".to_string()],
    };

    let err = GraphLoader::default().load(&doc).unwrap_err();
    assert!(matches!(err, GraphError::Parse(_)), "got {err}");
}

#[test]
fn unknown_operator_is_a_parse_error() {
    let doc = GraphDoc {
        name: "model".to_string(),
        inputs: vec![io("x", DType::F32, &[3])],
        initializers: vec![],
        nodes: vec![node("n0", "definitely_not_an_op", &["x"], &["y"])],
        outputs: vec!["y".to_string()],
    };
    let err = GraphLoader::default().load(&doc).unwrap_err();
    assert!(matches!(err, GraphError::Parse(_)), "got {err}");
}

#[test]
fn graphs_load_from_json() {
    let src = r#"{
        "name": "tiny",
        "inputs": [{"name": "x", "dtype": "F32", "dims": [2]}],
        "nodes": [{"op": "add", "inputs": ["x", "x"], "outputs": ["y"]}],
        "outputs": ["y"]
    }"#;
    let prog = GraphLoader::default().load_json(src).unwrap();
    assert_eq!(count_ops(&prog, "add"), 1);

    let mut bindings = HashMap::new();
    bindings.insert(
        "x".to_string(),
        TensorValue::from_f32([2], vec![1.5, 2.5]).unwrap(),
    );
    let outputs = run_program(&prog, &bindings).unwrap();
    match outputs[0].data() {
        ValueData::F32(values) => assert_eq!(values, &[3.0, 5.0]),
        other => panic!("unexpected output payload {other:?}"),
    }
}
