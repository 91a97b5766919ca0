pub mod analyzer;
pub mod dispatcher;
pub mod fake;
pub mod kubectl;
pub mod manifest;
pub mod pod;

pub use analyzer::*;
pub use dispatcher::*;
pub use fake::*;
pub use kubectl::*;
pub use manifest::*;
pub use pod::*;
