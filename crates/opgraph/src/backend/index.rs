use std::collections::HashMap;

use thiserror::Error;

use crate::backend::dialect::{Function, TensorType, ValueId};

/// Value types of a single dialect function, built while checking SSA form.
#[derive(Debug, Clone)]
pub struct FunctionIndices {
    value_types: HashMap<ValueId, TensorType>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FunctionIndexError {
    #[error("value {value} defined more than once")]
    DuplicateValue { value: ValueId },
    #[error("value {value} used before definition")]
    MissingValueDefinition { value: ValueId },
    #[error("function has {ids} parameter ids but {types} parameter types")]
    ParameterTypeCount { ids: usize, types: usize },
}

impl FunctionIndices {
    /// Builds indices and checks SSA form: single definition, definition before use, defined
    /// results.
    pub fn build(function: &Function) -> Result<Self, FunctionIndexError> {
        if function.parameter_ids.len() != function.parameters.len() {
            return Err(FunctionIndexError::ParameterTypeCount {
                ids: function.parameter_ids.len(),
                types: function.parameters.len(),
            });
        }

        let mut value_types = HashMap::new();
        for (id, ty) in function.parameter_ids.iter().zip(function.parameters.iter()) {
            if value_types.insert(*id, ty.clone()).is_some() {
                return Err(FunctionIndexError::DuplicateValue { value: *id });
            }
        }

        for instruction in &function.body {
            if let Some(operand) = instruction
                .operands
                .iter()
                .find(|operand| !value_types.contains_key(*operand))
            {
                return Err(FunctionIndexError::MissingValueDefinition { value: *operand });
            }
            if value_types
                .insert(instruction.id, instruction.output.clone())
                .is_some()
            {
                return Err(FunctionIndexError::DuplicateValue {
                    value: instruction.id,
                });
            }
        }

        for result in &function.result_ids {
            if !value_types.contains_key(result) {
                return Err(FunctionIndexError::MissingValueDefinition { value: *result });
            }
        }

        Ok(Self { value_types })
    }

    pub fn value_type(&self, value: ValueId) -> Option<&TensorType> {
        self.value_types.get(&value)
    }
}
