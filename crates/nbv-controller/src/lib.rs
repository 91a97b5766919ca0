pub mod config;
pub mod controller;
pub mod git_ops;
pub mod queue;
pub mod reconciler;
pub mod runtime;

pub use config::*;
pub use controller::*;
pub use git_ops::*;
pub use queue::*;
pub use reconciler::*;
pub use runtime::*;
