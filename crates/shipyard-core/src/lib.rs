pub mod classify;
pub mod config;
pub mod deadline;
pub mod error;
pub mod types;
pub mod url;

pub use config::{ConfigError, ShipyardConfig};
pub use error::PipelineError;
pub use types::*;

/// Current UTC time formatted as RFC 3339.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
