//! # Split-Column Resolution
//!
//! NMR integration software frequently reports one metabolite as several
//! overlapping sub-peaks ("Glucose 1", "Glucose 2") and additionally exports
//! summed composite columns ("Isoleucine+Leucine") that duplicate atomic data.
//! This module canonicalizes such column sets:
//!
//! 1. Columns whose name contains `+` are dropped: composites never carry
//!    independent concentration data and would corrupt group detection.
//! 2. Remaining names are split on the first space; a name with a suffix is
//!    grouped under its base name, in source column order. A bare column whose
//!    name equals a detected base joins that group.
//! 3. Each group becomes one column, the element-wise sum of its members. A
//!    missing member counts as 0 unless every member is missing at that row,
//!    in which case the sum stays missing.
//! 4. The summed column takes the position of the group's first member and the
//!    base name. Ungrouped columns pass through unchanged.
//!
//! The same plan drives [`ProtonReference`](crate::reference::ProtonReference)
//! normalization, guaranteeing that resolved dataset names and reference names
//! canonicalize identically. Resolution is idempotent: output names never
//! contain a split suffix or a `+`.

use log::{debug, info};

use crate::table::{Column, Table};

/// Result status of a resolution pass. Informational, never an error:
/// a dataset without split columns is clean, not wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// At least one split group was merged.
    Resolved {
        /// Number of base-name groups that were summed into one column.
        merged_groups: usize,
        /// Number of `+`-composite columns dropped before grouping.
        dropped_composites: usize,
    },
    /// No split groups were found; the operation was a no-op apart from
    /// composite-column drops.
    NoSplitColumns,
}

/// One entry of a resolution plan, referring to source columns by position.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PlanEntry {
    /// Pass the source column through unchanged.
    Keep(usize),
    /// Sum the listed source columns into one column named `base`.
    Sum { base: String, members: Vec<usize> },
}

/// A resolution plan built from a list of column names, applicable to any
/// name-parallel value set (table columns or reference scalars).
#[derive(Debug, Clone)]
pub(crate) struct SplitPlan {
    entries: Vec<PlanEntry>,
    merged_groups: usize,
    dropped_composites: usize,
}

/// Split a name on its first space into (base, suffix). Both halves must be
/// non-empty for the name to count as a sub-peak.
fn split_suffix(name: &str) -> Option<(&str, &str)> {
    let (base, suffix) = name.split_once(' ')?;
    if base.is_empty() || suffix.is_empty() {
        return None;
    }
    Some((base, suffix))
}

impl SplitPlan {
    /// Build a plan over the given column names.
    pub(crate) fn build<S: AsRef<str>>(names: &[S]) -> Self {
        // First pass: find every base that has at least one suffixed member,
        // so bare columns sharing a base name can join their group.
        let mut bases: Vec<&str> = Vec::new();
        for name in names {
            let name = name.as_ref();
            if name.contains('+') {
                continue;
            }
            if let Some((base, _)) = split_suffix(name) {
                if !bases.contains(&base) {
                    bases.push(base);
                }
            }
        }

        let mut entries: Vec<PlanEntry> = Vec::new();
        let mut dropped_composites = 0;

        for (idx, name) in names.iter().enumerate() {
            let name = name.as_ref();
            if name.contains('+') {
                debug!("dropping composite column {name:?}");
                dropped_composites += 1;
                continue;
            }
            let base = match split_suffix(name) {
                Some((base, _)) => base,
                None if bases.contains(&name) => name,
                None => {
                    entries.push(PlanEntry::Keep(idx));
                    continue;
                }
            };
            let group = entries
                .iter()
                .position(|entry| matches!(entry, PlanEntry::Sum { base: b, .. } if b == base));
            match group {
                Some(pos) => {
                    if let PlanEntry::Sum { members, .. } = &mut entries[pos] {
                        members.push(idx);
                    }
                }
                None => entries.push(PlanEntry::Sum {
                    base: base.to_string(),
                    members: vec![idx],
                }),
            }
        }

        let merged_groups = entries
            .iter()
            .filter(|entry| matches!(entry, PlanEntry::Sum { .. }))
            .count();

        SplitPlan {
            entries,
            merged_groups,
            dropped_composites,
        }
    }

    /// Status value summarizing this plan.
    pub(crate) fn outcome(&self) -> ResolveOutcome {
        if self.merged_groups == 0 {
            ResolveOutcome::NoSplitColumns
        } else {
            ResolveOutcome::Resolved {
                merged_groups: self.merged_groups,
                dropped_composites: self.dropped_composites,
            }
        }
    }

    /// Apply the plan to name→scalar pairs, summing grouped values.
    pub(crate) fn apply_scalars(&self, values: &[(String, f64)]) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .map(|entry| match entry {
                PlanEntry::Keep(idx) => values[*idx].clone(),
                PlanEntry::Sum { base, members } => {
                    let sum = members.iter().map(|&m| values[m].1).sum();
                    (base.clone(), sum)
                }
            })
            .collect()
    }
}

/// Sum a group of columns element-wise. A missing member counts as 0 unless
/// every member is missing at that row.
fn sum_members(columns: &[Column], members: &[usize], n_rows: usize) -> Vec<Option<f64>> {
    (0..n_rows)
        .map(|row| {
            let present: Vec<f64> = members
                .iter()
                .filter_map(|&m| columns[m].values[row])
                .collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum())
            }
        })
        .collect()
}

/// Merge split/duplicate metabolite columns of a table into canonical columns.
///
/// The input is left untouched; a new table over the same row index is
/// returned together with a [`ResolveOutcome`] describing what was done.
pub fn resolve_columns<K: Clone>(table: &Table<K>) -> (Table<K>, ResolveOutcome) {
    let names: Vec<&str> = table.column_names().collect();
    let plan = SplitPlan::build(&names);

    let mut resolved = Table::new(table.index().to_vec());
    for entry in &plan.entries {
        match entry {
            PlanEntry::Keep(idx) => {
                let column = &table.columns()[*idx];
                resolved
                    .push_column(column.name.clone(), column.values.clone())
                    .expect("source column length matches shared index");
            }
            PlanEntry::Sum { base, members } => {
                let values = sum_members(table.columns(), members, table.n_rows());
                resolved
                    .push_column(base.clone(), values)
                    .expect("summed column length matches shared index");
            }
        }
    }

    let outcome = plan.outcome();
    match &outcome {
        ResolveOutcome::Resolved {
            merged_groups,
            dropped_composites,
        } => info!(
            "resolved {merged_groups} split group(s), dropped {dropped_composites} composite column(s)"
        ),
        ResolveOutcome::NoSplitColumns => {
            info!("no split metabolite columns found, columns are clean")
        }
    }

    (resolved, outcome)
}
