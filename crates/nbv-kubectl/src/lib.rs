//! Process plumbing shared by every production adapter: `kubectl`/`oc` and other CLIs are
//! invoked through a `Runner`, so adapters can be exercised with a scripted runner in tests.

pub mod client;
pub mod runner;

pub use client::*;
pub use runner::*;
