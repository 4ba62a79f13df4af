//! Translation of an op graph into a graph-stage dialect module.

use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use crate::backend::dialect::{
    FunctionBuilder, GraphOp, Literal, Module, Operation, Stage, TensorType, ValueId,
};
use crate::ops::graph::Graph;
use crate::ops::kinds::OpKind;
use crate::ops::{NodeId, Output};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Builds a graph-stage module in a single traversal of everything reachable from the graph
/// results. Every graph parameter becomes a function parameter, in declaration order.
pub fn convert_graph(graph: &Graph, name: &str) -> Result<Module, ConversionError> {
    if graph.results().is_empty() {
        return Err(ConversionError::new("graph has no results"));
    }

    let mut builder = FunctionBuilder::new();
    let mut values: HashMap<Output, ValueId> = HashMap::new();
    for parameter in graph.parameters() {
        let id = builder.add_parameter(output_type(graph, parameter.output(0)));
        values.insert(parameter.output(0), id);
    }

    let order = graph.topological_order();
    for node in &order {
        let record = graph.node(*node);
        if matches!(record.kind(), OpKind::Parameter(_)) {
            continue;
        }
        let operands = record
            .inputs()
            .iter()
            .map(|input| {
                values.get(input).copied().ok_or_else(|| {
                    ConversionError::new(format!(
                        "{}: input {input} has no converted value",
                        graph.label(*node)
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let op = convert_node(graph, *node)?;
        let id = builder.emit(Operation::Graph(op), operands, output_type(graph, node.output(0)));
        values.insert(node.output(0), id);
    }

    let result_ids = graph
        .results()
        .iter()
        .map(|result| {
            values
                .get(result)
                .copied()
                .ok_or_else(|| ConversionError::new(format!("result {result} was not converted")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        "converted {} graph nodes into module @{name} ({} parameters)",
        order.len(),
        graph.parameters().len()
    );
    Ok(Module::new(name, Stage::Graph, builder.finish("main", result_ids)))
}

fn output_type(graph: &Graph, value: Output) -> TensorType {
    let desc = graph.desc(value);
    TensorType::new(desc.element_type, desc.shape.clone())
}

fn convert_node(graph: &Graph, node: NodeId) -> Result<GraphOp, ConversionError> {
    let record = graph.node(node);
    let output_rank = || {
        record.output(0).shape.rank().ok_or_else(|| {
            ConversionError::new(format!("{}: output rank is dynamic", graph.label(node)))
        })
    };
    let normalize = |axis: i64, rank: usize| {
        let normalized = if axis < 0 { axis + rank as i64 } else { axis };
        usize::try_from(normalized)
            .ok()
            .filter(|axis| *axis < rank)
            .ok_or_else(|| {
                ConversionError::new(format!(
                    "{}: axis {axis} out of range for rank {rank}",
                    graph.label(node)
                ))
            })
    };

    let op = match record.kind() {
        OpKind::Parameter(_) => {
            return Err(ConversionError::new(format!(
                "{}: parameters are converted as function arguments",
                graph.label(node)
            )))
        }
        OpKind::Constant(constant) => GraphOp::Constant(Literal {
            element_type: constant.element_type(),
            shape: constant.shape().clone(),
            values: constant.values().clone(),
        }),
        OpKind::Concat(concat) => GraphOp::Concat {
            axis: normalize(concat.axis(), output_rank()?)?,
        },
        OpKind::Add(add) => GraphOp::Add {
            broadcast: add.spec(),
        },
        OpKind::Sum(sum) => GraphOp::Sum {
            axes: sum.reduction_axes().clone(),
        },
        OpKind::BroadcastV0(broadcast) => GraphOp::Broadcast {
            axes: broadcast.broadcast_axes().clone(),
        },
        OpKind::BroadcastLike(broadcast) => GraphOp::BroadcastLike {
            operand_dims: broadcast
                .resolved()
                .map(|resolved| resolved.broadcast.operand_dims.clone()),
        },
        OpKind::Broadcast(broadcast) => GraphOp::DynamicBroadcast {
            version: broadcast.version().number(),
            spec: broadcast.spec(),
            operand_dims: broadcast
                .broadcast_axes(graph, node)
                .map(|resolved| resolved.operand_dims),
        },
        OpKind::ScatterUpdate(scatter) => GraphOp::ScatterUpdate {
            axis: normalize(scatter.axis(), output_rank()?)?,
        },
    };
    Ok(op)
}
