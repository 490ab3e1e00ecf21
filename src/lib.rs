//! # nmrquant - NMR Peak-Integration Quantification
//!
//! `nmrquant` converts raw 1D proton NMR peak-integration spectra, an
//! experiment metadata table, and a proton-count reference table into
//! per-metabolite molar concentrations, optionally aggregated across
//! replicate measurements.
//!
//! ## Pipeline
//!
//! Data flows strictly forward through an explicit state machine:
//!
//! ```text
//! spectra ─┐
//!          ├─ merge ─ resolve columns ─┐
//! metadata ┘                           ├─ concentrations ─ [aggregate]
//! proton reference ─ normalize ────────┘
//! ```
//!
//! - **Merge**: strict inner join of metadata and spectra on spectrum id;
//!   literal-zero intensities become missing ("no peak detected").
//! - **Resolve**: split sub-peak columns ("Glucose 1"/"Glucose 2") are summed
//!   into one canonical column; composite ("A+B") columns are dropped.
//! - **Normalize**: the proton reference is canonicalized with the same
//!   algorithm, so names always line up.
//! - **Concentrations**: `intensity × dilution_factor ÷ proton_count`, with
//!   missing values propagated, never zeroed.
//! - **Aggregate** (optional): per-(condition, time point) mean and sample
//!   standard deviation across replicates.
//!
//! ## Quick Start
//!
//! ```rust
//! use nmrquant::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut data = SpectralDataset::new(vec!["Glucose 1".into(), "Glucose 2".into()]);
//! data.push_spectrum(1, vec![Some(2.0), Some(3.0)])?;
//!
//! let mut metadata = MetadataTable::new();
//! metadata.push_record(1, MetadataRecord {
//!     condition: "control".into(),
//!     time_point: "T0".into(),
//!     replicate: 1,
//! })?;
//!
//! let reference = ProtonReference::from_entries(vec![
//!     ("Glucose 1".into(), 1.0),
//!     ("Glucose 2".into(), 1.0),
//! ]);
//!
//! let mut quantifier = Quantifier::new(PipelineConfig::new(5.0))?;
//! quantifier.load(data, metadata, reference);
//! quantifier.run()?;
//!
//! let concentrations = quantifier.concentrations().unwrap();
//! assert_eq!(concentrations.value(0, "Glucose"), Some(12.5));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Philosophy
//!
//! Every failure aborts the run at the point of detection and names the
//! offending key: an unmatched spectrum id, an unknown metabolite, a stage
//! invoked out of order. Nothing is downgraded to a default: a silently
//! zeroed column would corrupt every downstream concentration. Purely
//! informational conditions ("no split columns found") are status values
//! ([`resolve::ResolveOutcome`]), not errors.
//!
//! ## Modules
//!
//! - [`table`]: the keyed numeric tables every stage operates on
//! - [`resolve`]: split/duplicate column detection and merging
//! - [`reference`]: the proton-count reference table and its normalization
//! - [`merge`]: metadata × spectra join
//! - [`concentration`]: dilution and proton-count normalization
//! - [`aggregate`]: replicate means and standard deviations
//! - [`pipeline`]: the [`Quantifier`](pipeline::Quantifier) state machine
//! - [`io`]: CSV/TSV loading and export

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod aggregate;
pub mod concentration;
pub mod io;
pub mod merge;
pub mod pipeline;
pub mod reference;
pub mod resolve;
pub mod table;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::aggregate::AggregateTables;
    pub use crate::concentration::{Calibration, ConcentrationError};
    pub use crate::io::{LoadError, RunSummary};
    pub use crate::merge::MergeError;
    pub use crate::pipeline::{
        ExternalStandard, PipelineConfig, PipelineError, Quantifier, Stage,
    };
    pub use crate::reference::ProtonReference;
    pub use crate::resolve::ResolveOutcome;
    pub use crate::table::{
        GroupKey, MetadataRecord, MetadataTable, SampleKey, SpectralDataset, SpectrumId, Table,
    };
}
