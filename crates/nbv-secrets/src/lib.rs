pub mod kubectl;
pub mod resolver;
pub mod source;
pub mod vault;

pub use kubectl::*;
pub use resolver::*;
pub use source::*;
pub use vault::*;
