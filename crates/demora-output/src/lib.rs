#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/demora-analytics/demora/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bundle;
pub mod export;
pub mod records;

// Re-export main types
pub use bundle::ExportBundle;
pub use export::{ExportError, ExportFormat, Exporter, Tabular};
pub use records::{
    AssignmentRow, ComparisonRow, ExclusionRow, ImportanceRow, ScoreRow, StabilityRow, WarningRow,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
