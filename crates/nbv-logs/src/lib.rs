pub mod collector;
pub mod parser;
pub mod scripted;
pub mod wire;

pub use collector::*;
pub use parser::*;
pub use scripted::*;
