pub mod backoff;
pub mod commands;
pub mod conditions;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod ids;
pub mod model;
pub mod outcomes;
pub mod redact;
pub mod results;
pub mod tolerance;
pub mod types;
pub mod validate;

pub use backoff::*;
pub use commands::*;
pub use conditions::*;
pub use credentials::*;
pub use engine::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use outcomes::*;
pub use results::*;
pub use tolerance::*;
pub use types::*;
pub use validate::*;

/// Seconds since the Unix epoch; every timestamp in job status uses this clock.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
