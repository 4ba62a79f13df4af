//! Dialect IR produced from an op graph and progressively lowered by the pass pipeline.
//!
//! A [`Module`] holds a single SSA [`Function`]. Its [`Stage`] names the op family every
//! instruction must belong to:
//!
//! - `Graph`: one instruction per op-graph node, attributes copied verbatim,
//! - `Standard`: broadcasts normalized to `broadcast_in_dim` with explicit dimension maps,
//! - `Native`: fully static kernels with precomputed strides and output byte sizes.

use std::{collections::HashMap, fmt, fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ops::autobroadcast::AutoBroadcastSpec;
use crate::ops::kinds::ConstantValues;
use crate::tensor::{format_axes, AxisSet, AxisVector, Dimension, ElementType, PartialShape, Shape};

/// Dialect format version written into every serialized module.
pub const DIALECT_VERSION: &str = "opgraph.dialect.v1";

fn default_dialect_version() -> String {
    DIALECT_VERSION.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Graph,
    Standard,
    Native,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Graph => "graph",
            Stage::Standard => "standard",
            Stage::Native => "native",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Element type plus (possibly partial) shape of an SSA value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    pub element_type: ElementType,
    pub shape: PartialShape,
}

impl TensorType {
    pub fn new(element_type: ElementType, shape: PartialShape) -> Self {
        Self {
            element_type,
            shape,
        }
    }

    pub fn is_static(&self) -> bool {
        self.element_type.is_static() && self.shape.is_static()
    }

    pub fn static_shape(&self) -> Option<Shape> {
        self.shape.to_shape()
    }

    /// Storage size in bytes when the type is fully static.
    pub fn byte_len(&self) -> Option<usize> {
        let count = self.static_shape()?.checked_num_elements()?;
        match self.element_type.size_in_bytes() {
            Some(width) => count.checked_mul(width),
            None if self.element_type == ElementType::U1 => Some(count.div_ceil(8)),
            None => None,
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = match self.shape.dims() {
            None => "*".to_string(),
            Some([]) => "[]".to_string(),
            Some(dims) => dims
                .iter()
                .map(Dimension::to_string)
                .collect::<Vec<_>>()
                .join("x"),
        };
        write!(f, "tensor<{} x {}>", self.element_type, dims)
    }
}

/// Inline constant payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub element_type: ElementType,
    pub shape: Shape,
    pub values: ConstantValues,
}

/// Graph-stage operations, one per op-graph node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphOp {
    Constant(Literal),
    Concat {
        axis: usize,
    },
    Add {
        broadcast: AutoBroadcastSpec,
    },
    Sum {
        axes: AxisSet,
    },
    /// Static broadcast adding `axes` to the operand.
    Broadcast {
        axes: AxisSet,
    },
    /// Operands: arg, like. `operand_dims` is set once the like shape is static.
    BroadcastLike {
        operand_dims: Option<AxisVector>,
    },
    /// Operands: arg, target shape, axes mapping.
    DynamicBroadcast {
        version: u64,
        spec: AutoBroadcastSpec,
        operand_dims: Option<AxisVector>,
    },
    ScatterUpdate {
        axis: usize,
    },
}

impl GraphOp {
    pub fn name(&self) -> &'static str {
        match self {
            GraphOp::Constant(_) => "graph.constant",
            GraphOp::Concat { .. } => "graph.concat",
            GraphOp::Add { .. } => "graph.add",
            GraphOp::Sum { .. } => "graph.sum",
            GraphOp::Broadcast { .. } => "graph.broadcast",
            GraphOp::BroadcastLike { .. } => "graph.broadcast_like",
            GraphOp::DynamicBroadcast { .. } => "graph.dynamic_broadcast",
            GraphOp::ScatterUpdate { .. } => "graph.scatter_update",
        }
    }
}

/// Standard-stage operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardOp {
    Constant(Literal),
    Concat {
        axis: usize,
    },
    /// Operands and result share one shape.
    Add,
    ReduceSum {
        axes: AxisSet,
    },
    /// Operand axis `i` maps to result axis `broadcast_dimensions[i]`.
    BroadcastInDim {
        broadcast_dimensions: AxisVector,
    },
    /// Operands: arg, output shape tensor.
    DynamicBroadcastInDim {
        broadcast_dimensions: AxisVector,
    },
    Scatter {
        axis: usize,
    },
}

impl StandardOp {
    pub fn name(&self) -> &'static str {
        match self {
            StandardOp::Constant(_) => "std.constant",
            StandardOp::Concat { .. } => "std.concat",
            StandardOp::Add => "std.add",
            StandardOp::ReduceSum { .. } => "std.reduce_sum",
            StandardOp::BroadcastInDim { .. } => "std.broadcast_in_dim",
            StandardOp::DynamicBroadcastInDim { .. } => "std.dynamic_broadcast_in_dim",
            StandardOp::Scatter { .. } => "std.scatter",
        }
    }
}

/// Native kernels over contiguous row-major buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    Constant(Literal),
    Add {
        elements: usize,
    },
    ReduceSum {
        axes: AxisSet,
        input_strides: Vec<usize>,
        output_strides: Vec<usize>,
    },
    /// `input_strides[j]` is the input stride walked along output axis `j` (0 when replicated).
    Broadcast {
        input_strides: Vec<usize>,
        output_strides: Vec<usize>,
    },
    /// `offsets[k]` is where input `k` starts along `axis`.
    Concat {
        axis: usize,
        offsets: Vec<usize>,
        output_strides: Vec<usize>,
    },
    Scatter {
        axis: usize,
        data_strides: Vec<usize>,
        update_strides: Vec<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeOp {
    pub kernel: Kernel,
    pub output_bytes: usize,
}

impl NativeOp {
    pub fn name(&self) -> &'static str {
        match self.kernel {
            Kernel::Constant(_) => "native.constant",
            Kernel::Add { .. } => "native.add",
            Kernel::ReduceSum { .. } => "native.reduce_sum",
            Kernel::Broadcast { .. } => "native.broadcast",
            Kernel::Concat { .. } => "native.concat",
            Kernel::Scatter { .. } => "native.scatter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Graph(GraphOp),
    Standard(StandardOp),
    Native(NativeOp),
}

impl Operation {
    pub fn stage(&self) -> Stage {
        match self {
            Operation::Graph(_) => Stage::Graph,
            Operation::Standard(_) => Stage::Standard,
            Operation::Native(_) => Stage::Native,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Graph(op) => op.name(),
            Operation::Standard(op) => op.name(),
            Operation::Native(op) => op.name(),
        }
    }

    /// Required operand count; `None` for variadic operations.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Operation::Graph(op) => match op {
                GraphOp::Constant(_) => Some(0),
                GraphOp::Concat { .. } => None,
                GraphOp::Add { .. } => Some(2),
                GraphOp::Sum { .. } | GraphOp::Broadcast { .. } => Some(1),
                GraphOp::BroadcastLike { .. } => Some(2),
                GraphOp::DynamicBroadcast { .. } | GraphOp::ScatterUpdate { .. } => Some(3),
            },
            Operation::Standard(op) => match op {
                StandardOp::Constant(_) => Some(0),
                StandardOp::Concat { .. } => None,
                StandardOp::Add | StandardOp::DynamicBroadcastInDim { .. } => Some(2),
                StandardOp::ReduceSum { .. } | StandardOp::BroadcastInDim { .. } => Some(1),
                StandardOp::Scatter { .. } => Some(3),
            },
            Operation::Native(op) => match op.kernel {
                Kernel::Constant(_) => Some(0),
                Kernel::Concat { .. } => None,
                Kernel::Add { .. } => Some(2),
                Kernel::ReduceSum { .. } | Kernel::Broadcast { .. } => Some(1),
                Kernel::Scatter { .. } => Some(3),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: ValueId,
    pub op: Operation,
    pub operands: Vec<ValueId>,
    pub output: TensorType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub parameter_ids: Vec<ValueId>,
    pub parameters: Vec<TensorType>,
    pub body: Vec<Instruction>,
    pub result_ids: Vec<ValueId>,
    pub results: Vec<TensorType>,
}

impl Function {
    /// Largest value id in use plus one.
    pub fn next_value_id(&self) -> u32 {
        self.parameter_ids
            .iter()
            .chain(self.body.iter().map(|inst| &inst.id))
            .map(|id| id.0 + 1)
            .max()
            .unwrap_or(0)
    }

    /// Rewrites every use of `from` (operands and results) to `to`.
    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) -> usize {
        let mut replaced = 0;
        for inst in &mut self.body {
            for operand in &mut inst.operands {
                if *operand == from {
                    *operand = to;
                    replaced += 1;
                }
            }
        }
        for result in &mut self.result_ids {
            if *result == from {
                *result = to;
                replaced += 1;
            }
        }
        replaced
    }
}

/// Compilation unit handed between pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default = "default_dialect_version")]
    pub version: String,
    pub stage: Stage,
    pub name: String,
    pub function: Function,
}

#[derive(Debug, Error)]
pub enum ModuleSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("module version '{found}' does not match expected '{expected}'")]
    VersionMismatch {
        found: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ModuleIoError {
    #[error(transparent)]
    Serialization(#[from] ModuleSerdeError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Module {
    pub fn new(name: impl Into<String>, stage: Stage, function: Function) -> Self {
        Self {
            version: DIALECT_VERSION.to_string(),
            stage,
            name: name.into(),
            function,
        }
    }

    pub fn to_json_string(&self) -> Result<String, ModuleSerdeError> {
        serde_json::to_string_pretty(self).map_err(ModuleSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, ModuleSerdeError> {
        let mut module: Module = serde_json::from_str(src)?;
        module.version = normalize_version(module.version)?;
        Ok(module)
    }

    pub fn to_bincode_bytes(&self) -> Result<Vec<u8>, ModuleSerdeError> {
        bincode::serialize(self).map_err(ModuleSerdeError::from)
    }

    pub fn from_bincode_slice(bytes: &[u8]) -> Result<Self, ModuleSerdeError> {
        let mut module: Module = bincode::deserialize(bytes)?;
        module.version = normalize_version(module.version)?;
        Ok(module)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModuleIoError> {
        let contents = self.to_json_string()?;
        fs::write(path, contents).map_err(ModuleIoError::from)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ModuleIoError> {
        let contents = fs::read_to_string(path)?;
        Module::from_json_str(&contents).map_err(ModuleIoError::from)
    }

    /// FNV-1a hash of the bincode encoding; equal modules hash equally.
    pub fn fingerprint(&self) -> Result<u64, ModuleSerdeError> {
        Ok(fnv_hash(&self.to_bincode_bytes()?))
    }

    pub fn to_text(&self) -> String {
        format!("{self}")
    }
}

fn normalize_version(version: String) -> Result<String, ModuleSerdeError> {
    if version.is_empty() {
        return Ok(DIALECT_VERSION.to_string());
    }
    if version == DIALECT_VERSION {
        Ok(version)
    } else {
        Err(ModuleSerdeError::VersionMismatch {
            found: version,
            expected: DIALECT_VERSION,
        })
    }
}

pub(crate) fn fnv_hash(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(
            f,
            0,
            &format!(
                "module @{} (stage = {}, version = {}) {{",
                self.name, self.stage, self.version
            ),
        )?;
        fmt_function(&self.function, 1, f)?;
        write_line(f, 0, "}")
    }
}

fn fmt_function(function: &Function, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_line(f, indent, &format!("func @{} {{", function.name))?;
    if !function.parameter_ids.is_empty() {
        write_line(f, indent + 1, "params:")?;
        for (id, ty) in function.parameter_ids.iter().zip(function.parameters.iter()) {
            write_line(f, indent + 2, &format!("{id} : {ty}"))?;
        }
    }
    if !function.body.is_empty() {
        write_line(f, indent + 1, "body:")?;
        for instruction in &function.body {
            write_line(f, indent + 2, &format_instruction(instruction))?;
        }
    }
    if !function.result_ids.is_empty() {
        write_line(f, indent + 1, "results:")?;
        for (id, ty) in function.result_ids.iter().zip(function.results.iter()) {
            write_line(f, indent + 2, &format!("{id} : {ty}"))?;
        }
    }
    write_line(f, indent, "}")
}

fn format_instruction(instruction: &Instruction) -> String {
    let operands = instruction
        .operands
        .iter()
        .map(ValueId::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let attrs = format_attributes(&instruction.op);
    let attrs = if attrs.is_empty() {
        String::new()
    } else {
        format!(" {{{attrs}}}")
    };
    format!(
        "{} = {}({operands}){attrs} -> {}",
        instruction.id,
        instruction.op.name(),
        instruction.output
    )
}

fn format_attributes(op: &Operation) -> String {
    fn dims(values: &Option<AxisVector>) -> String {
        values
            .as_ref()
            .map_or_else(|| "?".to_string(), |dims| format_axes(dims))
    }
    fn literal(lit: &Literal) -> String {
        format!("{} {} x{}", lit.element_type, lit.shape, lit.values.len())
    }
    match op {
        Operation::Graph(op) => match op {
            GraphOp::Constant(lit) => literal(lit),
            GraphOp::Concat { axis } => format!("axis = {axis}"),
            GraphOp::Add { broadcast } => format!("broadcast = {broadcast}"),
            GraphOp::Sum { axes } => format!("axes = {axes}"),
            GraphOp::Broadcast { axes } => format!("axes = {axes}"),
            GraphOp::BroadcastLike { operand_dims } => {
                format!("operand_dims = {}", dims(operand_dims))
            }
            GraphOp::DynamicBroadcast {
                version,
                spec,
                operand_dims,
            } => format!(
                "version = {version}, spec = {spec}, operand_dims = {}",
                dims(operand_dims)
            ),
            GraphOp::ScatterUpdate { axis } => format!("axis = {axis}"),
        },
        Operation::Standard(op) => match op {
            StandardOp::Constant(lit) => literal(lit),
            StandardOp::Concat { axis } | StandardOp::Scatter { axis } => format!("axis = {axis}"),
            StandardOp::Add => String::new(),
            StandardOp::ReduceSum { axes } => format!("axes = {axes}"),
            StandardOp::BroadcastInDim {
                broadcast_dimensions,
            }
            | StandardOp::DynamicBroadcastInDim {
                broadcast_dimensions,
            } => format!("broadcast_dimensions = {}", format_axes(broadcast_dimensions)),
        },
        Operation::Native(op) => {
            let kernel = match &op.kernel {
                Kernel::Constant(lit) => literal(lit),
                Kernel::Add { elements } => format!("elements = {elements}"),
                Kernel::ReduceSum {
                    axes,
                    input_strides,
                    ..
                } => format!("axes = {axes}, input_strides = {}", format_axes(input_strides)),
                Kernel::Broadcast { input_strides, .. } => {
                    format!("input_strides = {}", format_axes(input_strides))
                }
                Kernel::Concat { axis, offsets, .. } => {
                    format!("axis = {axis}, offsets = {}", format_axes(offsets))
                }
                Kernel::Scatter { axis, .. } => format!("axis = {axis}"),
            };
            format!("{kernel}, bytes = {}", op.output_bytes)
        }
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}

/// Incremental builder for dialect functions.
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    next_value_id: u32,
    parameters: Vec<(ValueId, TensorType)>,
    instructions: Vec<Instruction>,
    value_types: HashMap<ValueId, TensorType>,
}

impl FunctionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter(&mut self, ty: TensorType) -> ValueId {
        let id = self.fresh_id();
        self.value_types.insert(id, ty.clone());
        self.parameters.push((id, ty));
        id
    }

    pub fn emit(&mut self, op: Operation, operands: Vec<ValueId>, output: TensorType) -> ValueId {
        let id = self.fresh_id();
        self.push(Instruction {
            id,
            op,
            operands,
            output,
        });
        id
    }

    fn push(&mut self, instruction: Instruction) {
        self.next_value_id = self.next_value_id.max(instruction.id.0 + 1);
        self.value_types
            .insert(instruction.id, instruction.output.clone());
        self.instructions.push(instruction);
    }

    pub fn finish(self, name: impl Into<String>, result_ids: Vec<ValueId>) -> Function {
        let results = result_ids
            .iter()
            .map(|id| {
                self.value_types
                    .get(id)
                    .expect("result value id must have a recorded type")
                    .clone()
            })
            .collect();
        let (parameter_ids, parameters) = self.parameters.into_iter().unzip();
        Function {
            name: name.into(),
            parameter_ids,
            parameters,
            body: self.instructions,
            result_ids,
            results,
        }
    }

    fn fresh_id(&mut self) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        id
    }
}
