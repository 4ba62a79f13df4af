use opgraph::ops::attrs::AttributeNames;
use opgraph::ops::kinds::Sum;
use opgraph::ops::{self, AutoBroadcastSpec, Graph, NodeId, OpKind, Output, ValidationRule};
use opgraph::tensor::{AxisSet, ElementType, PartialShape, Shape};
use serde_json::json;

fn f32_param(graph: &mut Graph, dims: &[usize]) -> Output {
    ops::v0::parameter(graph, ElementType::F32, Shape::new(dims.to_vec()))
}

#[test]
fn clone_preserves_attributes_with_new_inputs() {
    let mut graph = Graph::new();
    let first = f32_param(&mut graph, &[3]);
    let second = f32_param(&mut graph, &[3]);
    let original =
        ops::v0::broadcast(&mut graph, first, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();

    let copy = graph.clone_with_new_inputs(original.node, vec![second]).unwrap();
    assert_eq!(graph.node(copy).kind(), graph.node(original.node).kind());
    assert_eq!(
        graph.attributes_json(copy).unwrap(),
        graph.attributes_json(original.node).unwrap()
    );
    assert_eq!(graph.node(copy).inputs(), &[second]);
    assert!(!graph.structurally_equal(copy, original.node));
    assert_eq!(graph.partial_shape(copy.output(0)), graph.partial_shape(original));
}

#[test]
fn clone_of_dynamic_broadcast_keeps_mode() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, &[3]);
    let shape = ops::v0::constant_i64(&mut graph, &[2, 3]).unwrap();
    let original =
        ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::pdpd(1)).unwrap();
    let inputs = graph.node(original.node).inputs().to_vec();

    let copy = graph.clone_with_new_inputs(original.node, inputs).unwrap();
    assert!(graph.structurally_equal(copy, original.node));
    assert_eq!(
        graph.attributes_json(copy).unwrap(),
        json!({ "broadcast_spec": { "kind": "pdpd", "axis": 1 } })
    );
}

#[test]
#[should_panic(expected = "clone expects 1 inputs, got 2")]
fn clone_with_wrong_input_count_panics() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, &[3]);
    let out = ops::v0::broadcast(&mut graph, arg, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    let _ = graph.clone_with_new_inputs(out.node, vec![arg, arg]);
}

#[test]
fn clone_revalidates_against_new_inputs() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, &[3]);
    let wide = f32_param(&mut graph, &[4]);
    let out = ops::v0::broadcast(&mut graph, arg, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    let before = graph.len();
    let err = graph.clone_with_new_inputs(out.node, vec![wide]).unwrap_err();
    assert_eq!(err.rule, ValidationRule::IncompatibleShapes);
    assert_eq!(graph.len(), before);
}

#[test]
fn replace_input_reinfers_downstream() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, &[3]);
    let half = ops::v0::parameter(&mut graph, ElementType::F16, Shape::new(vec![3]));
    let wide = ops::v0::broadcast(&mut graph, arg, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    let total = ops::v0::sum(&mut graph, wide, AxisSet::from([0])).unwrap();
    let version = graph.version();

    graph.replace_input(wide.node, 0, half).unwrap();
    assert_eq!(graph.node(wide.node).input(0), half);
    assert_eq!(graph.element_type(wide), ElementType::F16);
    assert_eq!(graph.element_type(total), ElementType::F16);
    assert!(graph.version() > version);
}

#[test]
fn failed_replace_input_rolls_back() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, &[3]);
    let wrong = f32_param(&mut graph, &[4]);
    let wide = ops::v0::broadcast(&mut graph, arg, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    let total = ops::v0::sum(&mut graph, wide, AxisSet::from([0])).unwrap();
    let version = graph.version();

    let err = graph.replace_input(wide.node, 0, wrong).unwrap_err();
    assert_eq!(err.rule, ValidationRule::IncompatibleShapes);
    assert_eq!(graph.node(wide.node).input(0), arg);
    assert_eq!(graph.partial_shape(total), &PartialShape::from_static(&[3]));
    assert_eq!(graph.version(), version);
}

#[test]
fn parameter_shape_change_propagates() {
    let mut graph = Graph::new();
    let x = ops::v0::parameter(&mut graph, ElementType::F32, PartialShape::with_rank(1));
    let doubled = ops::v1::add(&mut graph, x, x, AutoBroadcastSpec::NONE).unwrap();
    assert_eq!(graph.partial_shape(doubled), &PartialShape::with_rank(1));

    graph
        .set_parameter_shape(x.node, ElementType::F32, Shape::new(vec![5]))
        .unwrap();
    assert_eq!(graph.partial_shape(doubled), &PartialShape::from_static(&[5]));
}

#[test]
fn failed_parameter_shape_change_rolls_back() {
    let mut graph = Graph::new();
    let x = f32_param(&mut graph, &[3]);
    let y = f32_param(&mut graph, &[3]);
    let total = ops::v1::add(&mut graph, x, y, AutoBroadcastSpec::NONE).unwrap();

    let err = graph
        .set_parameter_shape(x.node, ElementType::F32, Shape::new(vec![4]))
        .unwrap_err();
    assert_eq!(err.rule, ValidationRule::IncompatibleShapes);
    assert_eq!(graph.partial_shape(x), &PartialShape::from_static(&[3]));
    assert_eq!(graph.partial_shape(total), &PartialShape::from_static(&[3]));
}

#[test]
fn rewrites_that_close_a_cycle_are_rejected() {
    let mut graph = Graph::new();
    let x = f32_param(&mut graph, &[3]);
    let inner = ops::v1::add(&mut graph, x, x, AutoBroadcastSpec::NONE).unwrap();
    let outer = ops::v1::add(&mut graph, inner, inner, AutoBroadcastSpec::NONE).unwrap();

    let err = graph.replace_input(inner.node, 0, outer).unwrap_err();
    assert_eq!(err.rule, ValidationRule::CycleDetected);
    let err = graph.replace_input(inner.node, 1, inner).unwrap_err();
    assert_eq!(err.rule, ValidationRule::CycleDetected);
    assert_eq!(graph.node(inner.node).inputs(), &[x, x]);
}

#[test]
fn replacement_must_exist() {
    let mut graph = Graph::new();
    let x = f32_param(&mut graph, &[3]);
    let total = ops::v0::sum(&mut graph, x, AxisSet::new()).unwrap();
    let missing = NodeId(99).output(0);
    let err = graph.replace_input(total.node, 0, missing).unwrap_err();
    assert_eq!(err.rule, ValidationRule::UnknownInput);
}

#[test]
fn add_node_checks_arity() {
    let mut graph = Graph::new();
    let err = graph
        .add_node(OpKind::Sum(Sum::new(AxisSet::new())), Vec::new())
        .unwrap_err();
    assert_eq!(err.rule, ValidationRule::InputCount);
    assert!(graph.is_empty());
}

#[test]
fn revalidate_is_idempotent() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, &[2, 1]);
    let like = f32_param(&mut graph, &[2, 5]);
    let out = ops::v0::broadcast_like(&mut graph, arg, like, AxisSet::new()).unwrap();
    assert!(!graph.revalidate(out.node).unwrap());
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(&[2, 5]));
}

#[test]
fn attribute_names_follow_resolution_state() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, &[2, 1]);
    let like = ops::v0::parameter(&mut graph, ElementType::F32, PartialShape::dynamic());
    let out = ops::v0::broadcast_like(&mut graph, arg, like, AxisSet::new()).unwrap();

    let mut names = AttributeNames::default();
    graph.visit_attributes(out.node, &mut names);
    assert_eq!(names.0, vec!["initial_broadcast_axes"]);

    graph
        .set_parameter_shape(like.node, ElementType::F32, Shape::new(vec![2, 5]))
        .unwrap();
    let mut names = AttributeNames::default();
    graph.visit_attributes(out.node, &mut names);
    assert_eq!(names.0, vec!["shape", "broadcast_axes", "initial_broadcast_axes"]);
    assert_eq!(graph.attributes_json(out.node).unwrap()["broadcast_axes"], json!([1]));
}

#[test]
fn unreachable_nodes_are_skipped_by_traversal() {
    let mut graph = Graph::new();
    let x = f32_param(&mut graph, &[3]);
    let dead = ops::v0::sum(&mut graph, x, AxisSet::from([0])).unwrap();
    let live = ops::v0::broadcast(&mut graph, x, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    graph.add_result(live);

    let order = graph.topological_order();
    assert_eq!(order, vec![x.node, live.node]);
    assert!(!order.contains(&dead.node));
    assert_eq!(graph.users(x.node), vec![(dead.node, 0), (live.node, 0)]);
    assert!(graph.depends_on(live.node, x.node));
    assert!(!graph.depends_on(x.node, live.node));
}
