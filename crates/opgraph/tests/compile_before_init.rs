//! Runs in its own test binary so the process-wide runtime is never initialized.

use opgraph::backend::compile_graph;
use opgraph::ops::{self, Graph};
use opgraph::tensor::{AxisSet, ElementType, Shape};

#[test]
#[should_panic(expected = "call LoweringRuntime::initialize first")]
fn compiling_before_initialization_panics() {
    let mut graph = Graph::new();
    let x = ops::v0::parameter(&mut graph, ElementType::F32, Shape::new(vec![3]));
    let y = ops::v0::broadcast(&mut graph, x, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
    graph.add_result(y);
    let _ = compile_graph(&graph);
}
