//! # In-Memory Tables
//!
//! The minimal keyed numeric table shared by every pipeline stage, plus the
//! raw input holders ([`SpectralDataset`], [`MetadataTable`]).
//!
//! Design constraints:
//!
//! - **Missing is explicit**: every cell is `Option<f64>`. A raw intensity of
//!   literally zero means "no peak detected" and is rewritten to `None` during
//!   the merge, never treated as a true zero.
//!
//! - **Immutable stages**: transforms build a fresh [`Table`] instead of
//!   mutating their input, so each stage stays referentially transparent.
//!
//! - **Deterministic order**: row order is derived from key ordering and column
//!   order from source order, never from hash iteration.

use serde::Serialize;
use std::fmt;

/// Identifier of a single acquired spectrum. Positive and unique per dataset.
pub type SpectrumId = u32;

/// Errors raised while assembling raw input tables.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// The same spectrum id was inserted twice.
    #[error("duplicate spectrum id {0}")]
    DuplicateSpectrumId(SpectrumId),

    /// Spectrum ids are 1-based; zero is reserved as "not a spectrum".
    #[error("spectrum id must be positive")]
    ZeroSpectrumId,

    /// A row or column had the wrong number of values.
    #[error("expected {expected} values, got {got}")]
    LengthMismatch {
        /// Number of values required by the table shape.
        expected: usize,
        /// Number of values actually supplied.
        got: usize,
    },
}

/// Row identity of the merged and concentration tables:
/// the three experimental dimensions plus the originating spectrum.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SampleKey {
    /// Experimental condition label.
    pub condition: String,
    /// Time point label (kept as text; grouping never needs arithmetic on it).
    pub time_point: String,
    /// Replicate number within (condition, time point).
    pub replicate: u32,
    /// Source spectrum id.
    pub spectrum_id: SpectrumId,
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{} (spectrum {})",
            self.condition, self.time_point, self.replicate, self.spectrum_id
        )
    }
}

impl SampleKey {
    /// The aggregation group this sample belongs to (replicate axis dropped).
    pub fn group(&self) -> GroupKey {
        GroupKey {
            condition: self.condition.clone(),
            time_point: self.time_point.clone(),
        }
    }
}

/// Row identity of the aggregated mean/std tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    /// Experimental condition label.
    pub condition: String,
    /// Time point label.
    pub time_point: String,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.condition, self.time_point)
    }
}

/// One named numeric column, parallel to the table's row index.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Metabolite name.
    pub name: String,
    /// One value per row; `None` marks a missing measurement.
    pub values: Vec<Option<f64>>,
}

/// A keyed table of named numeric columns.
///
/// `K` is [`SampleKey`] for per-spectrum tables and [`GroupKey`] for the
/// aggregated tables. Shape invariant: every column holds exactly one value
/// per index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<K> {
    index: Vec<K>,
    columns: Vec<Column>,
}

impl<K> Table<K> {
    /// Create an empty table over the given row index.
    pub fn new(index: Vec<K>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Append a column. The value vector must match the row count.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), TableError> {
        if values.len() != self.index.len() {
            return Err(TableError::LengthMismatch {
                expected: self.index.len(),
                got: values.len(),
            });
        }
        self.columns.push(Column {
            name: name.into(),
            values,
        });
        Ok(())
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Row keys in table order.
    pub fn index(&self) -> &[K] {
        &self.index
    }

    /// Columns in table order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in table order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Look up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Value at (row, column name), if both exist and the cell is present.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name).and_then(|c| c.values.get(row).copied().flatten())
    }
}

/// Raw per-spectrum peak integrals, one row per spectrum, one column per
/// detected metabolite. No transformation logic lives here.
#[derive(Debug, Clone)]
pub struct SpectralDataset {
    metabolites: Vec<String>,
    rows: Vec<(SpectrumId, Vec<Option<f64>>)>,
}

impl SpectralDataset {
    /// Create an empty dataset with the given metabolite column names.
    pub fn new(metabolites: Vec<String>) -> Self {
        Self {
            metabolites,
            rows: Vec::new(),
        }
    }

    /// Append one spectrum's intensities (one value per metabolite column).
    pub fn push_spectrum(
        &mut self,
        id: SpectrumId,
        intensities: Vec<Option<f64>>,
    ) -> Result<(), TableError> {
        if id == 0 {
            return Err(TableError::ZeroSpectrumId);
        }
        if self.rows.iter().any(|(existing, _)| *existing == id) {
            return Err(TableError::DuplicateSpectrumId(id));
        }
        if intensities.len() != self.metabolites.len() {
            return Err(TableError::LengthMismatch {
                expected: self.metabolites.len(),
                got: intensities.len(),
            });
        }
        self.rows.push((id, intensities));
        Ok(())
    }

    /// Metabolite column names in source order.
    pub fn metabolites(&self) -> &[String] {
        &self.metabolites
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> &[(SpectrumId, Vec<Option<f64>>)] {
        &self.rows
    }

    /// All spectrum ids in insertion order.
    pub fn spectrum_ids(&self) -> impl Iterator<Item = SpectrumId> + '_ {
        self.rows.iter().map(|(id, _)| *id)
    }

    /// Intensity row for a spectrum id.
    pub fn intensities(&self, id: SpectrumId) -> Option<&[Option<f64>]> {
        self.rows
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, values)| values.as_slice())
    }

    /// Number of spectra.
    pub fn n_spectra(&self) -> usize {
        self.rows.len()
    }
}

/// Experimental labels for one spectrum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    /// Experimental condition label.
    pub condition: String,
    /// Time point label.
    pub time_point: String,
    /// Replicate number.
    pub replicate: u32,
}

/// Per-spectrum experimental labels, one row per spectrum.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    rows: Vec<(SpectrumId, MetadataRecord)>,
}

impl MetadataTable {
    /// Create an empty metadata table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the labels for one spectrum.
    pub fn push_record(
        &mut self,
        id: SpectrumId,
        record: MetadataRecord,
    ) -> Result<(), TableError> {
        if id == 0 {
            return Err(TableError::ZeroSpectrumId);
        }
        if self.rows.iter().any(|(existing, _)| *existing == id) {
            return Err(TableError::DuplicateSpectrumId(id));
        }
        self.rows.push((id, record));
        Ok(())
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> &[(SpectrumId, MetadataRecord)] {
        &self.rows
    }

    /// All spectrum ids in insertion order.
    pub fn spectrum_ids(&self) -> impl Iterator<Item = SpectrumId> + '_ {
        self.rows.iter().map(|(id, _)| *id)
    }

    /// Labels for a spectrum id.
    pub fn record(&self, id: SpectrumId) -> Option<&MetadataRecord> {
        self.rows
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, record)| record)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Distinct condition labels, in first-appearance order.
    pub fn conditions(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (_, record) in &self.rows {
            if !seen.contains(&record.condition) {
                seen.push(record.condition.clone());
            }
        }
        seen
    }

    /// Distinct time point labels, in first-appearance order.
    pub fn time_points(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (_, record) in &self.rows {
            if !seen.contains(&record.time_point) {
                seen.push(record.time_point.clone());
            }
        }
        seen
    }
}
