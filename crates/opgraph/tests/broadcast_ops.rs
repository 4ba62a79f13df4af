use opgraph::ops::kinds::constant::{constant, ConstantValues};
use opgraph::ops::{self, AutoBroadcastSpec, Graph, OpError, OpKind, Output, ValidationRule};
use opgraph::tensor::{AxisSet, Dimension, ElementType, PartialShape, Shape};
use rstest::rstest;

fn static_param(graph: &mut Graph, dims: &[usize]) -> Output {
    ops::v0::parameter(graph, ElementType::F32, Shape::new(dims.to_vec()))
}

fn target(graph: &mut Graph, dims: &[usize]) -> Output {
    let values: Vec<i64> = dims.iter().map(|dim| *dim as i64).collect();
    ops::v0::constant_i64(graph, &values).unwrap()
}

fn rule(err: &OpError) -> ValidationRule {
    err.as_validation()
        .unwrap_or_else(|| panic!("expected a validation error, got {err}"))
        .rule
}

#[rstest]
#[case(&[3], &[2, 3], &[2, 3])]
#[case(&[1, 3], &[4, 1], &[4, 3])]
#[case(&[2, 1], &[2, 5], &[2, 5])]
#[case(&[], &[2, 3], &[2, 3])]
#[case(&[4], &[4], &[4])]
fn numpy_broadcast_takes_max_extent(
    #[case] arg_dims: &[usize],
    #[case] target_dims: &[usize],
    #[case] expected: &[usize],
) {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, arg_dims);
    let shape = target(&mut graph, target_dims);
    let out = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(expected));
    assert_eq!(graph.element_type(out), ElementType::F32);
}

#[rstest]
#[case(&[3], &[2, 4], ValidationRule::BroadcastIncompatible)]
#[case(&[2, 3], &[3], ValidationRule::TargetRankTooSmall)]
#[case(&[2, 3], &[2, 2], ValidationRule::BroadcastIncompatible)]
fn numpy_broadcast_rejects_mismatched_extents(
    #[case] arg_dims: &[usize],
    #[case] target_dims: &[usize],
    #[case] expected: ValidationRule,
) {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, arg_dims);
    let shape = target(&mut graph, target_dims);
    let before = graph.len();
    let err = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap_err();
    assert_eq!(rule(&err), expected);
    // The placeholder axes constant is rolled back together with the broadcast.
    assert_eq!(graph.len(), before);
}

#[rstest]
#[case(&[3, 1], &[2, 1, 4], &[2, 3, 4])]
#[case(&[1], &[5, 6], &[5, 6])]
#[case(&[4, 1], &[1, 7], &[4, 7])]
#[case(&[2, 3], &[3], &[2, 3])]
fn bidirectional_broadcast_is_symmetric(
    #[case] lhs: &[usize],
    #[case] rhs: &[usize],
    #[case] expected: &[usize],
) {
    let mut graph = Graph::new();
    let lhs_arg = static_param(&mut graph, lhs);
    let rhs_target = target(&mut graph, rhs);
    let forward =
        ops::v3::broadcast_auto(&mut graph, lhs_arg, rhs_target, AutoBroadcastSpec::BIDIRECTIONAL)
            .unwrap();

    let rhs_arg = static_param(&mut graph, rhs);
    let lhs_target = target(&mut graph, lhs);
    let backward =
        ops::v3::broadcast_auto(&mut graph, rhs_arg, lhs_target, AutoBroadcastSpec::BIDIRECTIONAL)
            .unwrap();

    let expected = PartialShape::from_static(expected);
    assert_eq!(graph.partial_shape(forward), &expected);
    assert_eq!(graph.partial_shape(backward), &expected);
}

#[test]
fn bidirectional_is_unknown_to_revision_one() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let shape = target(&mut graph, &[2, 3]);
    let before = graph.len();
    let err =
        ops::v1::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::BIDIRECTIONAL).unwrap_err();
    let unsupported = err.as_unsupported().unwrap();
    assert_eq!(unsupported.capability, "autobroadcast");
    assert_eq!(graph.len(), before);
}

#[rstest]
#[case(&[1, 0])]
#[case(&[1, 1])]
fn explicit_mapping_must_be_strictly_ascending(#[case] mapping: &[i64]) {
    for revision in [1, 3] {
        let mut graph = Graph::new();
        let arg = static_param(&mut graph, &[3, 3]);
        let shape = target(&mut graph, &[3, 3]);
        let axes = ops::v0::constant_i64(&mut graph, mapping).unwrap();
        let before = graph.len();
        let result = if revision == 1 {
            ops::v1::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NONE)
        } else {
            ops::v3::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NONE)
        };
        let err = result.unwrap_err();
        assert_eq!(rule(&err), ValidationRule::AxesMappingNotSorted);
        assert_eq!(graph.len(), before);
    }
}

#[test]
fn explicit_broadcast_places_arg_on_mapped_axes() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let shape = target(&mut graph, &[2, 3]);
    let axes = ops::v0::constant_i64(&mut graph, &[1]).unwrap();
    let out = ops::v3::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NONE).unwrap();
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(&[2, 3]));

    let OpKind::Broadcast(op) = graph.node(out.node).kind() else {
        panic!("expected a broadcast node");
    };
    let resolved = op.broadcast_axes(&graph, out.node).unwrap();
    assert_eq!(resolved.axes, AxisSet::from([0]));
    assert_eq!(resolved.operand_dims.as_slice(), &[1]);
}

#[test]
fn explicit_mapping_extent_mismatch_fails() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let shape = target(&mut graph, &[2, 3]);
    let axes = ops::v0::constant_i64(&mut graph, &[0]).unwrap();
    let err = ops::v3::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NONE).unwrap_err();
    assert_eq!(rule(&err), ValidationRule::AxesMappingDimMismatch);
}

#[rstest]
#[case(&[5], ValidationRule::AxesMappingOutOfRange)]
#[case(&[0, 1], ValidationRule::AxesMappingSize)]
fn explicit_mapping_shape_errors(#[case] mapping: &[i64], #[case] expected: ValidationRule) {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let shape = target(&mut graph, &[2, 3]);
    let axes = ops::v0::constant_i64(&mut graph, mapping).unwrap();
    let err = ops::v1::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NONE).unwrap_err();
    assert_eq!(rule(&err), expected);
}

#[test]
fn constructor_must_match_mode() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let shape = target(&mut graph, &[2, 3]);
    let axes = ops::v0::constant_i64(&mut graph, &[1]).unwrap();

    let err = ops::v3::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NUMPY).unwrap_err();
    assert_eq!(rule(&err), ValidationRule::BroadcastModeConstructor);

    let err = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NONE).unwrap_err();
    assert_eq!(rule(&err), ValidationRule::BroadcastModeConstructor);
}

#[rstest]
#[case(AutoBroadcastSpec::pdpd(1), &[3], &[2, 3, 4])]
#[case(AutoBroadcastSpec::pdpd(-1), &[4], &[2, 3, 4])]
#[case(AutoBroadcastSpec::pdpd(0), &[2, 1], &[2, 3, 4])]
fn pdpd_aligns_at_start_axis(
    #[case] spec: AutoBroadcastSpec,
    #[case] arg_dims: &[usize],
    #[case] target_dims: &[usize],
) {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, arg_dims);
    let shape = target(&mut graph, target_dims);
    let out = ops::v1::broadcast_auto(&mut graph, arg, shape, spec).unwrap();
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(target_dims));
}

#[test]
fn pdpd_start_past_target_rank_fails() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3, 4]);
    let shape = target(&mut graph, &[2, 3, 4]);
    let err = ops::v1::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::pdpd(2)).unwrap_err();
    assert_eq!(rule(&err), ValidationRule::TargetRankTooSmall);
}

#[test]
fn concat_target_resolves_per_dimension() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let rows = ops::v0::constant_i64(&mut graph, &[2]).unwrap();
    let cols = ops::v0::parameter(&mut graph, ElementType::I64, Shape::new(vec![1]));
    let shape = ops::v0::concat(&mut graph, vec![rows, cols], 0).unwrap();
    let out = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(&[2, 3]));
}

#[test]
fn concat_target_ignores_pieces_that_are_not_single_extents() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let empty = ops::v0::constant_i64(&mut graph, &[]).unwrap();
    let pair = ops::v0::constant_i64(&mut graph, &[2, 3]).unwrap();
    let shape = ops::v0::concat(&mut graph, vec![empty, pair], 0).unwrap();
    assert_eq!(graph.partial_shape(shape), &PartialShape::from_static(&[2]));

    let out = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    assert_eq!(
        graph.partial_shape(out),
        &PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(3)])
    );
}

#[test]
fn opaque_target_leaves_rank_unknown() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let shape = ops::v0::parameter(&mut graph, ElementType::I64, Shape::new(vec![2]));
    let out = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    assert_eq!(graph.partial_shape(out), &PartialShape::dynamic());
}

#[test]
fn target_shape_must_be_integral_and_non_negative() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let float_shape = constant(
        &mut graph,
        ElementType::F32,
        Shape::new(vec![2]),
        ConstantValues::Float(vec![2.0, 3.0]),
    )
    .unwrap();
    let err =
        ops::v3::broadcast_auto(&mut graph, arg, float_shape, AutoBroadcastSpec::NUMPY).unwrap_err();
    assert_eq!(rule(&err), ValidationRule::IntegralTypeRequired);

    let negative = ops::v0::constant_i64(&mut graph, &[-1, 3]).unwrap();
    let err =
        ops::v3::broadcast_auto(&mut graph, arg, negative, AutoBroadcastSpec::NUMPY).unwrap_err();
    assert_eq!(rule(&err), ValidationRule::NegativeShapeValue);
}

#[test]
fn numpy_axes_cover_stretched_and_prepended_dimensions() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[1, 3]);
    let shape = target(&mut graph, &[5, 4, 3]);
    let out = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    let OpKind::Broadcast(op) = graph.node(out.node).kind() else {
        panic!("expected a broadcast node");
    };
    let resolved = op.broadcast_axes(&graph, out.node).unwrap();
    assert_eq!(resolved.axes, AxisSet::from([0, 1]));
    assert_eq!(resolved.operand_dims.as_slice(), &[1, 2]);
    assert_eq!(resolved.expanded_arg_axes(), AxisSet::from([0]));
}

#[rstest]
#[case(AxisSet::from([0]), Ok(vec![2, 3]))]
#[case(AxisSet::from([2]), Err(ValidationRule::AxisOutOfRange))]
#[case(AxisSet::from([1]), Err(ValidationRule::IncompatibleShapes))]
fn legacy_broadcast(#[case] axes: AxisSet, #[case] expected: Result<Vec<usize>, ValidationRule>) {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let result = ops::v0::broadcast(&mut graph, arg, Shape::new(vec![2, 3]), axes);
    match expected {
        Ok(dims) => {
            let out = result.unwrap();
            assert_eq!(graph.partial_shape(out), &PartialShape::from_static(&dims));
        }
        Err(expected) => assert_eq!(result.unwrap_err().rule, expected),
    }
}

#[test]
fn broadcast_like_recomputes_axes_when_like_shape_changes() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[2, 1]);
    let like = static_param(&mut graph, &[2, 5]);
    let out = ops::v0::broadcast_like(&mut graph, arg, like, AxisSet::new()).unwrap();

    let axes_of = |graph: &Graph| match graph.node(out.node).kind() {
        OpKind::BroadcastLike(op) => op.resolved().map(|resolved| resolved.broadcast.axes.clone()),
        other => panic!("unexpected kind {other:?}"),
    };
    assert_eq!(axes_of(&graph), Some(AxisSet::from([1])));
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(&[2, 5]));

    graph
        .set_parameter_shape(like.node, ElementType::F32, Shape::new(vec![2, 7, 4]))
        .unwrap();
    assert_eq!(axes_of(&graph), Some(AxisSet::from([1, 2])));
    assert_eq!(graph.partial_shape(out), &PartialShape::from_static(&[2, 7, 4]));

    graph
        .set_parameter_shape(like.node, ElementType::F32, PartialShape::with_rank(2))
        .unwrap();
    assert_eq!(axes_of(&graph), None);
    assert_eq!(graph.partial_shape(out), &PartialShape::with_rank(2));
}

#[test]
fn broadcast_like_with_initial_axes_uses_removed_layout() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let like = static_param(&mut graph, &[2, 3]);
    let out = ops::v0::broadcast_like(&mut graph, arg, like, AxisSet::from([0])).unwrap();
    let OpKind::BroadcastLike(op) = graph.node(out.node).kind() else {
        panic!("expected a broadcast-like node");
    };
    let resolved = op.resolved().unwrap();
    assert_eq!(resolved.shape, Shape::new(vec![2, 3]));
    assert_eq!(resolved.broadcast.axes, AxisSet::from([0]));
    assert_eq!(resolved.broadcast.operand_dims.as_slice(), &[1]);
}

#[rstest]
#[case(&[2, 3])]
#[case(&[3])]
fn broadcast_like_rejects_axes_past_like_rank(#[case] arg_dims: &[usize]) {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, arg_dims);
    let like = static_param(&mut graph, &[2, 3]);
    let before = graph.len();
    let err = ops::v0::broadcast_like(&mut graph, arg, like, AxisSet::from([5])).unwrap_err();
    assert_eq!(err.rule, ValidationRule::AxisOutOfRange);
    assert_eq!(graph.len(), before);
}

#[test]
fn broadcast_like_axis_range_is_checked_when_like_resolves() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[2, 3]);
    let like = ops::v0::parameter(&mut graph, ElementType::F32, PartialShape::dynamic());
    let out = ops::v0::broadcast_like(&mut graph, arg, like, AxisSet::from([5])).unwrap();
    assert_eq!(graph.partial_shape(out), &PartialShape::dynamic());

    let err = graph
        .set_parameter_shape(like.node, ElementType::F32, Shape::new(vec![2, 3]))
        .unwrap_err();
    assert_eq!(err.rule, ValidationRule::AxisOutOfRange);
    assert_eq!(graph.partial_shape(like), &PartialShape::dynamic());
    assert_eq!(graph.partial_shape(out), &PartialShape::dynamic());
}

#[test]
fn type_info_carries_revision() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let shape = target(&mut graph, &[2, 3]);
    let v1 = ops::v1::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    let v3 = ops::v3::broadcast_auto(&mut graph, arg, shape, AutoBroadcastSpec::NUMPY).unwrap();
    let v0 = ops::v0::broadcast(&mut graph, arg, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    let like = ops::v0::broadcast_like(&mut graph, arg, v0, AxisSet::from([0])).unwrap();

    let info = |value: Output| graph.node(value.node).type_info().to_string();
    assert_eq!(info(v1), "Broadcast.v1");
    assert_eq!(info(v3), "Broadcast.v3");
    assert_eq!(info(v0), "Broadcast.v0");
    assert_eq!(info(like), "BroadcastLike.v0");
}

#[test]
fn every_dynamic_broadcast_input_is_shape_relevant() {
    let mut graph = Graph::new();
    let arg = static_param(&mut graph, &[3]);
    let shape = target(&mut graph, &[2, 3]);
    let axes = ops::v0::constant_i64(&mut graph, &[1]).unwrap();
    let out = ops::v3::broadcast(&mut graph, arg, shape, axes, AutoBroadcastSpec::NONE).unwrap();

    let record = graph.node(out.node);
    assert!((0..3).all(|index| record.is_input_relevant_to_shape(index)));
    assert!(!record.is_input_relevant_to_shape(3));

    let constant = graph.node(shape.node).kind().as_constant().unwrap();
    assert_eq!(constant.shape_value(), Some(Shape::new(vec![2, 3])));
}
