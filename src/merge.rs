//! # Metadata Merge
//!
//! Inner-joins the experiment metadata with the spectral dataset on spectrum
//! id, producing the merged table every later stage operates on. The join is
//! strict: an id present on one side only aborts the merge with every orphan
//! named, since a partial join would silently drop measurements.
//!
//! During the join, literal-zero intensities are rewritten to missing: the
//! integration software writes 0 where no peak was detected, which is not a
//! measured concentration of zero.

use log::{debug, info};

use crate::table::{MetadataTable, SampleKey, SpectralDataset, SpectrumId, Table};

/// Errors raised by the metadata merge.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Spectrum ids did not match one-to-one between the two tables.
    #[error(
        "spectrum ids without metadata: {missing_metadata:?}; \
         metadata rows without a spectrum: {missing_spectra:?}"
    )]
    MissingMetadata {
        /// Ids present in the spectral dataset but absent from the metadata.
        missing_metadata: Vec<SpectrumId>,
        /// Ids present in the metadata but absent from the spectral dataset.
        missing_spectra: Vec<SpectrumId>,
    },
}

/// Join metadata and spectral data into one table indexed by
/// (condition, time point, replicate, spectrum id), rows ordered by that key.
///
/// Every spectrum id must appear in both tables exactly once (uniqueness is
/// already enforced at insertion). Zero intensities become missing here.
pub fn merge(
    metadata: &MetadataTable,
    data: &SpectralDataset,
) -> Result<Table<SampleKey>, MergeError> {
    let missing_metadata: Vec<SpectrumId> = data
        .spectrum_ids()
        .filter(|id| metadata.record(*id).is_none())
        .collect();
    let missing_spectra: Vec<SpectrumId> = metadata
        .spectrum_ids()
        .filter(|id| data.intensities(*id).is_none())
        .collect();
    if !missing_metadata.is_empty() || !missing_spectra.is_empty() {
        return Err(MergeError::MissingMetadata {
            missing_metadata,
            missing_spectra,
        });
    }

    let mut keys: Vec<SampleKey> = data
        .spectrum_ids()
        .map(|id| {
            let record = metadata
                .record(id)
                .expect("join verified above: every spectrum has metadata");
            SampleKey {
                condition: record.condition.clone(),
                time_point: record.time_point.clone(),
                replicate: record.replicate,
                spectrum_id: id,
            }
        })
        .collect();
    keys.sort();

    let mut merged = Table::new(keys);
    for (column_idx, name) in data.metabolites().iter().enumerate() {
        let values: Vec<Option<f64>> = merged
            .index()
            .iter()
            .map(|key| {
                let row = data
                    .intensities(key.spectrum_id)
                    .expect("join verified above: every key maps to a spectrum");
                match row[column_idx] {
                    // No peak detected, not a true zero.
                    Some(value) if value == 0.0 => None,
                    other => other,
                }
            })
            .collect();
        merged
            .push_column(name.clone(), values)
            .expect("column length matches merged index");
    }

    debug!(
        "merged table: {} rows, {} metabolite columns",
        merged.n_rows(),
        merged.n_columns()
    );
    info!("metadata merge done");
    Ok(merged)
}
