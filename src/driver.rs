//! The async driver: runs a [`Mac`](crate::core::Mac) inside a tokio task,
//! feeding it commands and the wall clock and dispatching its outputs.
//!
//! 异步驱动：在 tokio 任务中运行 [`Mac`](crate::core::Mac)，
//! 为其提供命令和时钟，并分发其输出。
mod actor;
pub mod command;
pub mod handle;
pub mod traits;

pub use command::{DriverCommand, MacIndication};
pub use handle::MacHandle;
pub use traits::Radio;
