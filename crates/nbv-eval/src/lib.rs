pub mod compare;
pub mod diff;
pub mod normalize;
pub mod platform;
pub mod serving;

pub use compare::*;
pub use diff::*;
pub use normalize::*;
pub use platform::*;
pub use serving::*;
