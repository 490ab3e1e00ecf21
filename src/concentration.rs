//! # Concentration Calculation
//!
//! Converts resolved peak intensities into molar concentrations:
//!
//! ```text
//! concentration = intensity × dilution_factor ÷ proton_count
//! ```
//!
//! where `proton_count` is an exact-name lookup in the normalized proton
//! reference. Missing intensities stay missing. A resolved metabolite without
//! a reference entry aborts the whole calculation, because zeroing or dropping the
//! column would corrupt the output without any visible trace.

use log::{debug, info};

use crate::reference::ProtonReference;
use crate::table::{SampleKey, Table};

/// Errors raised while computing concentrations.
#[derive(Debug, thiserror::Error)]
pub enum ConcentrationError {
    /// A resolved metabolite has no entry in the proton reference.
    #[error("no proton reference entry for metabolite {0:?}")]
    UnresolvedMetabolite(String),

    /// External-standard calibration was requested without a standard
    /// concentration value.
    #[error("external calibration requested but no standard concentration was supplied")]
    StandardConcentrationMissing,
}

/// Calibration mode for a quantification run, fixed at pipeline construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Calibration {
    /// Quantify against the internal reference; every resolved column is
    /// normalized.
    Internal,
    /// Quantify against an external standard of known concentration. The
    /// standard's own intensity column is excluded from the output entirely:
    /// it is removed before reference lookup and never normalized.
    ExternalStandard {
        /// Name of the standard's intensity column in the resolved dataset.
        column: String,
        /// Caller-supplied standard concentration.
        concentration: f64,
    },
}

/// Compute the concentration table from a resolved dataset.
///
/// The output shares the input's row index. Column order follows the input,
/// minus the external standard's column when that calibration is active.
pub fn compute_concentrations(
    resolved: &Table<SampleKey>,
    reference: &ProtonReference,
    dilution_factor: f64,
    calibration: &Calibration,
) -> Result<Table<SampleKey>, ConcentrationError> {
    let excluded = match calibration {
        Calibration::Internal => None,
        Calibration::ExternalStandard { column, concentration } => {
            debug!("external standard {column:?} at {concentration}, column excluded");
            Some(column.as_str())
        }
    };

    let mut concentrations = Table::new(resolved.index().to_vec());
    for column in resolved.columns() {
        if excluded == Some(column.name.as_str()) {
            continue;
        }
        let proton_count = reference
            .proton_count(&column.name)
            .ok_or_else(|| ConcentrationError::UnresolvedMetabolite(column.name.clone()))?;
        let values: Vec<Option<f64>> = column
            .values
            .iter()
            .map(|cell| cell.map(|intensity| intensity * dilution_factor / proton_count))
            .collect();
        concentrations
            .push_column(column.name.clone(), values)
            .expect("concentration column length matches shared index");
    }

    info!(
        "computed concentrations for {} metabolite(s) over {} sample(s)",
        concentrations.n_columns(),
        concentrations.n_rows()
    );
    Ok(concentrations)
}
