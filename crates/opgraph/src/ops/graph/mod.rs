mod arena;
mod infer;
mod state;

pub use arena::Graph;
pub use infer::InferCx;
pub use state::NodeRecord;
