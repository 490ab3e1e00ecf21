//! # Proton Reference Table
//!
//! Maps each metabolite to its proton-equivalent count (Heq): the number of
//! protons contributing to its integrated signal. Concentration calculation
//! divides by this count, so the reference must canonicalize its names with
//! exactly the same split-merge algorithm that resolves dataset columns;
//! otherwise a resolved column could miss its reference entry purely because
//! the two tables disagreed on the canonical name.

use log::info;

use crate::resolve::{ResolveOutcome, SplitPlan};

/// Ordered metabolite → proton-equivalent count mapping.
///
/// Entry order follows the source table; lookups are by exact name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProtonReference {
    entries: Vec<(String, f64)>,
}

impl ProtonReference {
    /// Create an empty reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a reference from (name, Heq) pairs, keeping source order.
    pub fn from_entries(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    /// Append one entry.
    pub fn push(&mut self, name: impl Into<String>, heq: f64) {
        self.entries.push((name.into(), heq));
    }

    /// Entries in table order.
    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    /// Exact-name Heq lookup.
    pub fn proton_count(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, heq)| *heq)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonicalize the reference: sub-peak entries sharing a base name are
    /// summed into one entry, composite (`+`) entries are deleted. Returns the
    /// normalized table (the input is untouched) and a status value.
    ///
    /// Idempotent: normalizing a normalized table changes nothing.
    pub fn normalize(&self) -> (ProtonReference, ResolveOutcome) {
        let names: Vec<&str> = self.entries.iter().map(|(name, _)| name.as_str()).collect();
        let plan = SplitPlan::build(&names);
        let normalized = ProtonReference {
            entries: plan.apply_scalars(&self.entries),
        };

        let outcome = plan.outcome();
        match &outcome {
            ResolveOutcome::Resolved { merged_groups, .. } => {
                info!("normalized proton reference, merged {merged_groups} split entrie(s)")
            }
            ResolveOutcome::NoSplitColumns => {
                info!("no split metabolites in proton reference, entries are clean")
            }
        }
        (normalized, outcome)
    }
}

/// Normalize the decimal separator of a raw Heq cell: the reference table is
/// commonly exported with `,` as the decimal mark.
pub fn normalize_decimal_separator(raw: &str) -> String {
    raw.trim().replace(',', ".")
}
