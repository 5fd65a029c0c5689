//! Actions: targets (outbound endpoints) and the executions binding them to
//! conditions. Both are owned by the instance.

mod execution;
mod target;

pub use execution::ExecutionWriteModel;
pub use target::{AddTarget, ChangeTarget, TargetWriteModel};
