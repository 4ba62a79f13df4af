use opgraph::ops::{self, Adjoints, AutoBroadcastSpec, Graph, OpError, OpKind, Output};
use opgraph::tensor::{AxisSet, ElementType, PartialShape, Shape};

fn f32_param(graph: &mut Graph, shape: impl Into<PartialShape>) -> Output {
    ops::v0::parameter(graph, ElementType::F32, shape)
}

fn reduction_axes(graph: &Graph, value: Output) -> AxisSet {
    match graph.node(value.node).kind() {
        OpKind::Sum(sum) => sum.reduction_axes().clone(),
        other => panic!("expected a sum, got {other:?}"),
    }
}

fn assert_unsupported(err: OpError) {
    let unsupported = err
        .as_unsupported()
        .unwrap_or_else(|| panic!("expected an unsupported error, got {err}"));
    assert_eq!(unsupported.capability, "differentiation");
}

#[test]
fn static_explicit_broadcast_reduces_over_broadcast_axes() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, Shape::new(vec![3]));
    let shape = ops::v0::constant_i64(&mut graph, &[2, 3]).unwrap();
    let axes = ops::v0::constant_i64(&mut graph, &[1]).unwrap();
    let out = ops::v3::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NONE).unwrap();
    let seed = f32_param(&mut graph, Shape::new(vec![2, 3]));

    let adjoints = Adjoints::backprop(&mut graph, out, seed).unwrap();
    let delta = adjoints.delta(arg).unwrap();
    assert_eq!(reduction_axes(&graph, delta), AxisSet::from([0]));
    assert_eq!(graph.node(delta.node).input(0), seed);
    assert_eq!(graph.partial_shape(delta), &PartialShape::from_static(&[3]));
    assert_eq!(adjoints.delta(shape), None);
}

#[test]
fn stretched_unit_axes_are_restored() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, Shape::new(vec![1, 3]));
    let shape = ops::v0::constant_i64(&mut graph, &[4, 3]).unwrap();
    let out = ops::v1::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    let seed = f32_param(&mut graph, Shape::new(vec![4, 3]));

    let adjoints = Adjoints::backprop(&mut graph, out, seed).unwrap();
    let delta = adjoints.delta(arg).unwrap();
    assert_eq!(graph.partial_shape(delta), &PartialShape::from_static(&[1, 3]));
    let OpKind::BroadcastV0(restore) = graph.node(delta.node).kind() else {
        panic!("expected a legacy broadcast restoring the unit axis");
    };
    assert_eq!(restore.broadcast_axes(), &AxisSet::from([0]));
    let reduced = graph.node(delta.node).input(0);
    assert_eq!(reduction_axes(&graph, reduced), AxisSet::from([0]));
}

#[test]
fn dynamic_arg_shape_is_unsupported() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, PartialShape::dynamic());
    let shape = ops::v0::constant_i64(&mut graph, &[2, 3]).unwrap();
    let axes = ops::v0::constant_i64(&mut graph, &[1]).unwrap();
    let out = ops::v3::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NONE).unwrap();
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(&[2, 3]));
    let seed = f32_param(&mut graph, Shape::new(vec![2, 3]));

    let len = graph.len();
    let err = Adjoints::backprop(&mut graph, out, seed).unwrap_err();
    assert_unsupported(err);
    assert_eq!(graph.len(), len);
}

#[test]
fn dynamic_target_shape_is_unsupported() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, Shape::new(vec![3]));
    let shape = ops::v0::parameter(&mut graph, ElementType::I64, Shape::new(vec![2]));
    let out = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    let seed = f32_param(&mut graph, PartialShape::dynamic());

    let len = graph.len();
    let err = Adjoints::backprop(&mut graph, out, seed).unwrap_err();
    assert_unsupported(err);
    assert_eq!(graph.len(), len);
}

#[test]
fn unresolved_broadcast_like_is_unsupported() {
    let mut graph = Graph::new();
    let arg = f32_param(&mut graph, Shape::new(vec![3]));
    let like = f32_param(&mut graph, PartialShape::with_rank(2));
    let out = ops::v0::broadcast_like(&mut graph, arg, like, AxisSet::from([0])).unwrap();
    let seed = f32_param(&mut graph, PartialShape::with_rank(2));

    let err = Adjoints::backprop(&mut graph, out, seed).unwrap_err();
    assert_unsupported(err);
}

#[test]
fn contributions_to_one_value_are_summed() {
    let mut graph = Graph::new();
    let x = f32_param(&mut graph, Shape::new(vec![3]));
    let left = ops::v0::broadcast(&mut graph, x, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    let right = ops::v0::broadcast(&mut graph, x, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    let total = ops::v1::add(&mut graph, left, right, AutoBroadcastSpec::NONE).unwrap();
    let seed = f32_param(&mut graph, Shape::new(vec![2, 3]));

    let adjoints = Adjoints::backprop(&mut graph, total, seed).unwrap();
    assert_eq!(adjoints.delta(left), Some(seed));
    assert_eq!(adjoints.delta(right), Some(seed));
    let delta = adjoints.delta(x).unwrap();
    assert!(matches!(graph.node(delta.node).kind(), OpKind::Add(_)));
    for input in graph.node(delta.node).inputs() {
        assert_eq!(reduction_axes(&graph, *input), AxisSet::from([0]));
    }
}

#[test]
fn numpy_add_reduces_broadcast_operand() {
    let mut graph = Graph::new();
    let matrix = f32_param(&mut graph, Shape::new(vec![2, 3]));
    let row = f32_param(&mut graph, Shape::new(vec![3]));
    let total = ops::v1::add(&mut graph, matrix, row, AutoBroadcastSpec::NUMPY).unwrap();
    let seed = f32_param(&mut graph, Shape::new(vec![2, 3]));

    let adjoints = Adjoints::backprop(&mut graph, total, seed).unwrap();
    assert_eq!(adjoints.delta(matrix), Some(seed));
    let delta = adjoints.delta(row).unwrap();
    assert_eq!(reduction_axes(&graph, delta), AxisSet::from([0]));
}

#[test]
fn sum_adjoint_broadcasts_back() {
    let mut graph = Graph::new();
    let x = f32_param(&mut graph, Shape::new(vec![2, 3]));
    let total = ops::v0::sum(&mut graph, x, AxisSet::from([1])).unwrap();
    let seed = f32_param(&mut graph, Shape::new(vec![2]));

    let adjoints = Adjoints::backprop(&mut graph, total, seed).unwrap();
    let delta = adjoints.delta(x).unwrap();
    let OpKind::BroadcastV0(expand) = graph.node(delta.node).kind() else {
        panic!("expected a legacy broadcast");
    };
    assert_eq!(expand.shape(), &Shape::new(vec![2, 3]));
    assert_eq!(expand.broadcast_axes(), &AxisSet::from([1]));
}

#[test]
fn scatter_update_has_no_adjoint_rule() {
    let mut graph = Graph::new();
    let data = f32_param(&mut graph, Shape::new(vec![4, 3]));
    let indices = ops::v0::parameter(&mut graph, ElementType::I64, Shape::new(vec![2]));
    let updates = f32_param(&mut graph, Shape::new(vec![2, 3]));
    let out = ops::v2::scatter_update(&mut graph, data, indices, updates, 0).unwrap();
    assert!(!graph.node(out.node).kind().supports_adjoints());

    let seed = f32_param(&mut graph, Shape::new(vec![4, 3]));
    let len = graph.len();
    let err = Adjoints::backprop(&mut graph, out, seed).unwrap_err();
    assert_unsupported(err);
    assert_eq!(graph.len(), len);
}

#[test]
fn failed_backprop_removes_partial_adjoints() {
    let mut graph = Graph::new();
    let data = f32_param(&mut graph, Shape::new(vec![4, 3]));
    let indices = ops::v0::parameter(&mut graph, ElementType::I64, Shape::new(vec![2]));
    let updates = f32_param(&mut graph, Shape::new(vec![2, 3]));
    let scattered = ops::v2::scatter_update(&mut graph, data, indices, updates, 0).unwrap();
    let shape = ops::v0::constant_i64(&mut graph, &[2, 4, 3]).unwrap();
    let out = ops::v3::broadcast_auto(&mut graph, scattered, shape, AutoBroadcastSpec::NUMPY).unwrap();
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(&[2, 4, 3]));
    let seed = f32_param(&mut graph, Shape::new(vec![2, 4, 3]));

    let len = graph.len();
    let err = Adjoints::backprop(&mut graph, out, seed).unwrap_err();
    assert_unsupported(err);
    assert_eq!(graph.len(), len);
    assert_eq!(graph.users(scattered.node), vec![(out.node, 0)]);
}

#[test]
fn seed_must_match_root() {
    let mut graph = Graph::new();
    let x = f32_param(&mut graph, Shape::new(vec![3]));
    let out = ops::v0::broadcast(&mut graph, x, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    let seed = f32_param(&mut graph, Shape::new(vec![5]));
    let err = Adjoints::backprop(&mut graph, out, seed).unwrap_err();
    assert!(err.as_validation().is_some());
}
