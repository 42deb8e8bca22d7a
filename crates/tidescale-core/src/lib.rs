//! tidescale-core — shared types for the tidescale autoscaler.
//!
//! Holds the fixed registry of parameter kinds, the typed parameter
//! store that strategies read from, the workload descriptor handed in by
//! the embedding caller, and the daemon's TOML configuration.
//!
//! # Parameter kinds
//!
//! ```text
//! kind      native          textual form
//! int       i64             strict base-10 ("42", "-7")
//! float     f64             decimal or exponent ("4.2", "1e3")
//! string    String          taken verbatim
//! bool      bool            1/0, t/f, true/false (any case)
//! duration  Duration        compound quantity+unit ("10s", "5m30s")
//! ```

pub mod config;
pub mod duration;
pub mod error;
pub mod parameter;
pub mod values;
pub mod workload;

pub use config::DaemonConfig;
pub use duration::parse_duration;
pub use error::ConversionError;
pub use parameter::{ParameterName, ParameterType, ParameterValue};
pub use values::ParameterValues;
pub use workload::{epoch_secs, Workload};
