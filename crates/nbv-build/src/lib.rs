pub mod backend;
pub mod contract;
pub mod dockerfile;
pub mod fake;
pub mod orchestrator;
pub mod s2i;
pub mod tekton;

pub use backend::*;
pub use contract::*;
pub use dockerfile::*;
pub use fake::*;
pub use orchestrator::*;
pub use s2i::*;
pub use tekton::*;
