//! Writing a complete run to a directory.

use crate::export::{ExportError, ExportFormat, Exporter};
use demora_data::{Exclusion, Warning};
use demora_forecast::{ImportanceReport, VariantComparison};
use demora_risk::ScoreSheet;
use demora_typology::{ClusterAssignment, StabilityReport};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Borrowed outputs of one pipeline run
#[derive(Debug, Clone, Copy)]
pub struct ExportBundle<'a> {
    /// Ranked variant comparison
    pub comparison: &'a VariantComparison,
    /// Permutation importance of the selected model
    pub importance: &'a ImportanceReport,
    /// Typology of the scoring period
    pub clusters: &'a ClusterAssignment,
    /// Stability of the typology
    pub stability: &'a StabilityReport,
    /// Vulnerability scores
    pub scores: &'a ScoreSheet,
    /// Observations dropped while building matrices
    pub exclusions: &'a [Exclusion],
    /// Every warning of the run
    pub warnings: &'a [Warning],
}

impl ExportBundle<'_> {
    /// Write one file per output into `dir`, creating it when needed
    ///
    /// Returns the written paths in a fixed order.
    pub fn write_to_dir(&self, dir: &Path, format: ExportFormat) -> Result<Vec<PathBuf>, ExportError> {
        fs::create_dir_all(dir)?;
        let outputs: [(&str, &dyn Exporter); 7] = [
            ("comparison", self.comparison),
            ("importance", self.importance),
            ("clusters", self.clusters),
            ("stability", self.stability),
            ("scores", self.scores),
            ("exclusions", &self.exclusions),
            ("warnings", &self.warnings),
        ];

        let mut written = Vec::with_capacity(outputs.len());
        for (name, output) in outputs {
            let path = dir.join(format!("{name}.{}", format.extension()));
            output.export_to_file(&path, format)?;
            debug!(path = %path.display(), "wrote output");
            written.push(path);
        }
        info!(dir = %dir.display(), %format, files = written.len(), "exported run");
        Ok(written)
    }
}
