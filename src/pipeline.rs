//! # Quantification Pipeline
//!
//! The [`Quantifier`] drives the whole run as an explicit state machine:
//!
//! ```text
//! INIT → DATA_LOADED → METADATA_MERGED → COLUMNS_RESOLVED
//!      → REFERENCE_RESOLVED → CONCENTRATIONS_COMPUTED → [AGGREGATED]
//! ```
//!
//! Each stage consumes the previous stage's table and produces a fresh one;
//! nothing is recomputed implicitly and no stage is auto-run. Invoking a stage
//! before its predecessor completed is a [`PipelineError::PrerequisiteMissing`]
//! naming the missing stage.
//!
//! Optional behavior (replicate aggregation, external-standard calibration) is
//! declared up front in [`PipelineConfig`] and validated once at construction,
//! never discovered mid-run.

use std::fmt;

use log::info;

use crate::aggregate::{aggregate, AggregateTables};
use crate::concentration::{compute_concentrations, Calibration, ConcentrationError};
use crate::merge::{merge, MergeError};
use crate::reference::ProtonReference;
use crate::resolve::{resolve_columns, ResolveOutcome};
use crate::table::{GroupKey, MetadataTable, SampleKey, SpectralDataset, Table};

/// The stages of a quantification run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// All three input tables are loaded.
    DataLoaded,
    /// Metadata and spectral data are joined.
    MetadataMerged,
    /// Split metabolite columns are merged.
    ColumnsResolved,
    /// The proton reference is normalized.
    ReferenceResolved,
    /// Concentrations are computed.
    ConcentrationsComputed,
    /// Replicates are aggregated into means and standard deviations.
    Aggregated,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DataLoaded => "DATA_LOADED",
            Stage::MetadataMerged => "METADATA_MERGED",
            Stage::ColumnsResolved => "COLUMNS_RESOLVED",
            Stage::ReferenceResolved => "REFERENCE_RESOLVED",
            Stage::ConcentrationsComputed => "CONCENTRATIONS_COMPUTED",
            Stage::Aggregated => "AGGREGATED",
        };
        f.write_str(name)
    }
}

/// Errors raised by the pipeline itself or forwarded from its stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage was invoked before its predecessor completed.
    #[error("stage {stage} requires {missing} to have completed first")]
    PrerequisiteMissing {
        /// The stage that was invoked.
        stage: Stage,
        /// The predecessor that has not completed.
        missing: Stage,
    },

    /// The dilution factor must be a positive, finite scalar.
    #[error("dilution factor must be positive and finite, got {0}")]
    InvalidDilutionFactor(f64),

    /// Metadata merge failure.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Concentration calculation failure, including a missing standard
    /// concentration detected at construction.
    #[error(transparent)]
    Concentration(#[from] ConcentrationError),
}

/// External-standard calibration as requested by the caller. The
/// concentration is optional here so that its absence can be reported as
/// [`ConcentrationError::StandardConcentrationMissing`] at construction
/// instead of silently defaulting.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalStandard {
    /// Name of the standard's intensity column in the dataset.
    pub column: String,
    /// Known concentration of the standard, supplied by the caller.
    pub concentration: Option<f64>,
}

/// Run configuration, validated once by [`Quantifier::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Dilution correction applied to every intensity. Must be positive.
    pub dilution_factor: f64,
    /// External-standard calibration; `None` means internal calibration.
    pub external_standard: Option<ExternalStandard>,
    /// Whether [`Quantifier::run`] should aggregate replicates at the end.
    pub compute_mean: bool,
}

impl PipelineConfig {
    /// Internal calibration, no aggregation.
    pub fn new(dilution_factor: f64) -> Self {
        Self {
            dilution_factor,
            external_standard: None,
            compute_mean: false,
        }
    }
}

/// The quantification pipeline. One instance owns one run's tables; nothing
/// is shared across runs, so callers may parallelize at run granularity.
#[derive(Debug)]
pub struct Quantifier {
    dilution_factor: f64,
    calibration: Calibration,
    compute_mean: bool,

    data: Option<SpectralDataset>,
    metadata: Option<MetadataTable>,
    reference: Option<ProtonReference>,

    merged: Option<Table<SampleKey>>,
    resolved: Option<Table<SampleKey>>,
    normalized_reference: Option<ProtonReference>,
    concentrations: Option<Table<SampleKey>>,
    aggregates: Option<AggregateTables>,
}

impl Quantifier {
    /// Build a pipeline from a validated configuration.
    ///
    /// Fails immediately on a non-positive dilution factor or on an
    /// external-standard request without a supplied concentration.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        if !(config.dilution_factor.is_finite() && config.dilution_factor > 0.0) {
            return Err(PipelineError::InvalidDilutionFactor(config.dilution_factor));
        }
        let calibration = match config.external_standard {
            None => Calibration::Internal,
            Some(ExternalStandard {
                column,
                concentration: Some(concentration),
            }) => Calibration::ExternalStandard {
                column,
                concentration,
            },
            Some(ExternalStandard {
                concentration: None,
                ..
            }) => {
                return Err(ConcentrationError::StandardConcentrationMissing.into());
            }
        };
        Ok(Self {
            dilution_factor: config.dilution_factor,
            calibration,
            compute_mean: config.compute_mean,
            data: None,
            metadata: None,
            reference: None,
            merged: None,
            resolved: None,
            normalized_reference: None,
            concentrations: None,
            aggregates: None,
        })
    }

    /// Load the three input tables, completing the DATA_LOADED stage.
    pub fn load(
        &mut self,
        data: SpectralDataset,
        metadata: MetadataTable,
        reference: ProtonReference,
    ) {
        info!(
            "loaded {} spectra, {} metadata rows, {} reference entries",
            data.n_spectra(),
            metadata.n_rows(),
            reference.len()
        );
        self.data = Some(data);
        self.metadata = Some(metadata);
        self.reference = Some(reference);
    }

    fn prerequisite<'a, T>(
        slot: &'a Option<T>,
        stage: Stage,
        missing: Stage,
    ) -> Result<&'a T, PipelineError> {
        slot.as_ref()
            .ok_or(PipelineError::PrerequisiteMissing { stage, missing })
    }

    /// METADATA_MERGED: join metadata with spectral data.
    pub fn merge_metadata(&mut self) -> Result<(), PipelineError> {
        let data = Self::prerequisite(&self.data, Stage::MetadataMerged, Stage::DataLoaded)?;
        let metadata =
            Self::prerequisite(&self.metadata, Stage::MetadataMerged, Stage::DataLoaded)?;
        self.merged = Some(merge(metadata, data)?);
        Ok(())
    }

    /// COLUMNS_RESOLVED: merge split metabolite columns of the merged table.
    pub fn resolve_columns(&mut self) -> Result<ResolveOutcome, PipelineError> {
        let merged =
            Self::prerequisite(&self.merged, Stage::ColumnsResolved, Stage::MetadataMerged)?;
        let (resolved, outcome) = resolve_columns(merged);
        self.resolved = Some(resolved);
        Ok(outcome)
    }

    /// REFERENCE_RESOLVED: normalize the proton reference with the same
    /// split-merge algorithm used for the dataset columns.
    pub fn normalize_reference(&mut self) -> Result<ResolveOutcome, PipelineError> {
        Self::prerequisite(
            &self.resolved,
            Stage::ReferenceResolved,
            Stage::ColumnsResolved,
        )?;
        let reference =
            Self::prerequisite(&self.reference, Stage::ReferenceResolved, Stage::DataLoaded)?;
        let (normalized, outcome) = reference.normalize();
        self.normalized_reference = Some(normalized);
        Ok(outcome)
    }

    /// CONCENTRATIONS_COMPUTED: apply dilution and proton-count normalization.
    pub fn compute_concentrations(&mut self) -> Result<(), PipelineError> {
        let resolved = Self::prerequisite(
            &self.resolved,
            Stage::ConcentrationsComputed,
            Stage::ColumnsResolved,
        )?;
        let reference = Self::prerequisite(
            &self.normalized_reference,
            Stage::ConcentrationsComputed,
            Stage::ReferenceResolved,
        )?;
        self.concentrations = Some(compute_concentrations(
            resolved,
            reference,
            self.dilution_factor,
            &self.calibration,
        )?);
        Ok(())
    }

    /// AGGREGATED: collapse the replicate axis into means and standard
    /// deviations.
    pub fn aggregate(&mut self) -> Result<(), PipelineError> {
        let concentrations = Self::prerequisite(
            &self.concentrations,
            Stage::Aggregated,
            Stage::ConcentrationsComputed,
        )?;
        self.aggregates = Some(aggregate(concentrations));
        Ok(())
    }

    /// Run every stage in order, aggregating only when the configuration
    /// requested it.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        self.merge_metadata()?;
        self.resolve_columns()?;
        self.normalize_reference()?;
        self.compute_concentrations()?;
        if self.compute_mean {
            self.aggregate()?;
        }
        Ok(())
    }

    /// The merged table, if METADATA_MERGED completed.
    pub fn merged(&self) -> Option<&Table<SampleKey>> {
        self.merged.as_ref()
    }

    /// The column-resolved table, if COLUMNS_RESOLVED completed.
    pub fn resolved(&self) -> Option<&Table<SampleKey>> {
        self.resolved.as_ref()
    }

    /// The normalized proton reference, if REFERENCE_RESOLVED completed.
    pub fn normalized_reference(&self) -> Option<&ProtonReference> {
        self.normalized_reference.as_ref()
    }

    /// The concentration table, if CONCENTRATIONS_COMPUTED completed.
    pub fn concentrations(&self) -> Option<&Table<SampleKey>> {
        self.concentrations.as_ref()
    }

    /// The per-group mean table, if AGGREGATED completed.
    pub fn means(&self) -> Option<&Table<GroupKey>> {
        self.aggregates.as_ref().map(|tables| &tables.mean)
    }

    /// The per-group standard-deviation table, if AGGREGATED completed.
    pub fn stds(&self) -> Option<&Table<GroupKey>> {
        self.aggregates.as_ref().map(|tables| &tables.std)
    }

    /// Canonical metabolite names of the resolved dataset, if available.
    pub fn metabolites(&self) -> Option<Vec<String>> {
        self.resolved
            .as_ref()
            .map(|table| table.column_names().map(str::to_string).collect())
    }
}
