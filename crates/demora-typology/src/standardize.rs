//! Z-score standardization of the clustering features.

use demora_data::Warning;
use demora_data::stats::column_summary;
use ndarray::{Array2, ArrayView2, Axis};
use tracing::warn;

/// Below this population std a feature is treated as constant
const ZERO_VARIANCE: f64 = 1e-12;

/// Center each column and scale it to unit population variance
///
/// A constant column becomes all zeros and yields a `ZeroVarianceFeature`
/// warning.
pub fn standardize(data: ArrayView2<'_, f64>, names: &[String]) -> (Array2<f64>, Vec<Warning>) {
    let mut out = data.to_owned();
    let mut warnings = Vec::new();

    for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
        let summary = column_summary(column.view());
        match summary {
            Some(s) if s.std > ZERO_VARIANCE => column.mapv_inplace(|v| (v - s.mean) / s.std),
            _ => {
                let feature = names.get(j).cloned().unwrap_or_else(|| format!("#{j}"));
                warn!(feature = %feature, "zero-variance clustering feature");
                column.fill(0.0);
                warnings.push(Warning::ZeroVarianceFeature { feature });
            }
        }
    }

    (out, warnings)
}
