//! Runtime: render context, hooks, program execution, and the load protocol.

pub mod context;
pub mod engine;
pub mod executor;
pub mod hooks;
pub mod value;
