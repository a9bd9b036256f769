#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/demora-analytics/demora/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export main types from sub-crates
pub use demora_data as data;
pub use demora_forecast as forecast;
pub use demora_output as output;
pub use demora_risk as risk;
pub use demora_typology as typology;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineOutput};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
