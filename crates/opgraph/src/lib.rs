//! Typed, shape-inferring op graph with reverse-mode adjoints and a staged lowering pipeline.

pub mod backend;
mod env;
pub mod ops;
pub mod tensor;

pub use env::PASS_OPTIONS_VAR;
