pub mod error;
pub mod model;
pub mod traits;
pub mod wire;

pub use error::{PkError, PkResult, WorkflowStage};
pub use model::*;
pub use traits::*;
