//! # Replicate Aggregation
//!
//! Collapses the replicate axis of the concentration table: rows are grouped
//! by (condition, time point) and each metabolite gets an arithmetic mean and
//! a sample (n−1) standard deviation per group.
//!
//! Missing cells are excluded from a group's sample. A group contributing a
//! single value has an undefined variance, so its standard deviation is
//! missing, explicitly not zero, and not an error.

use log::info;

use crate::table::{GroupKey, SampleKey, Table};

/// The two aggregated output tables, sharing one group index.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTables {
    /// Per-group arithmetic mean of each metabolite.
    pub mean: Table<GroupKey>,
    /// Per-group sample standard deviation of each metabolite.
    pub std: Table<GroupKey>,
}

/// Mean and sample standard deviation of the present values.
///
/// Returns (`None`, `None`) for an empty sample and (mean, `None`) for a
/// single-value sample.
fn mean_and_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    match values.len() {
        0 => (None, None),
        1 => (Some(values[0]), None),
        n => {
            let mean = values.iter().sum::<f64>() / n as f64;
            let variance = values
                .iter()
                .map(|value| (value - mean).powi(2))
                .sum::<f64>()
                / (n - 1) as f64;
            (Some(mean), Some(variance.sqrt()))
        }
    }
}

/// Aggregate a concentration table over replicates.
///
/// Groups appear in the order their first row appears, which is key order
/// because merged rows are sorted by [`SampleKey`]. The output column set
/// equals the input column set.
pub fn aggregate(concentrations: &Table<SampleKey>) -> AggregateTables {
    let mut groups: Vec<(GroupKey, Vec<usize>)> = Vec::new();
    for (row, key) in concentrations.index().iter().enumerate() {
        let group = key.group();
        match groups.iter().position(|(existing, _)| *existing == group) {
            Some(pos) => groups[pos].1.push(row),
            None => groups.push((group, vec![row])),
        }
    }

    let index: Vec<GroupKey> = groups.iter().map(|(key, _)| key.clone()).collect();
    let mut mean = Table::new(index.clone());
    let mut std = Table::new(index);

    for column in concentrations.columns() {
        let mut means = Vec::with_capacity(groups.len());
        let mut stds = Vec::with_capacity(groups.len());
        for (_, rows) in &groups {
            let sample: Vec<f64> = rows.iter().filter_map(|&row| column.values[row]).collect();
            let (group_mean, group_std) = mean_and_std(&sample);
            means.push(group_mean);
            stds.push(group_std);
        }
        mean.push_column(column.name.clone(), means)
            .expect("mean column length matches group index");
        std.push_column(column.name.clone(), stds)
            .expect("std column length matches group index");
    }

    info!(
        "aggregated {} sample(s) into {} group(s)",
        concentrations.n_rows(),
        mean.n_rows()
    );
    AggregateTables { mean, std }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(condition: &str, time_point: &str, replicate: u32, id: u32) -> SampleKey {
        SampleKey {
            condition: condition.into(),
            time_point: time_point.into(),
            replicate,
            spectrum_id: id,
        }
    }

    #[test]
    fn test_mean_and_sample_std() {
        let mut conc = Table::new(vec![
            key("ctrl", "T0", 1, 1),
            key("ctrl", "T0", 2, 2),
        ]);
        conc.push_column("Alanine", vec![Some(10.0), Some(12.0)])
            .unwrap();

        let tables = aggregate(&conc);
        assert_eq!(tables.mean.n_rows(), 1);
        assert_eq!(tables.mean.value(0, "Alanine"), Some(11.0));
        let std = tables.std.value(0, "Alanine").unwrap();
        assert!((std - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_single_replicate_has_missing_std() {
        let mut conc = Table::new(vec![key("ctrl", "T0", 1, 1)]);
        conc.push_column("Alanine", vec![Some(4.0)]).unwrap();

        let tables = aggregate(&conc);
        assert_eq!(tables.mean.value(0, "Alanine"), Some(4.0));
        assert_eq!(tables.std.column("Alanine").unwrap().values, vec![None]);
    }

    #[test]
    fn test_missing_cells_excluded_from_sample() {
        let mut conc = Table::new(vec![
            key("ctrl", "T0", 1, 1),
            key("ctrl", "T0", 2, 2),
            key("ctrl", "T0", 3, 3),
        ]);
        conc.push_column("Alanine", vec![Some(10.0), None, Some(12.0)])
            .unwrap();

        let tables = aggregate(&conc);
        assert_eq!(tables.mean.value(0, "Alanine"), Some(11.0));
        assert!(tables.std.value(0, "Alanine").is_some());
    }

    #[test]
    fn test_all_missing_group_stays_missing() {
        let mut conc = Table::new(vec![key("ctrl", "T0", 1, 1), key("ctrl", "T0", 2, 2)]);
        conc.push_column("Alanine", vec![None, None]).unwrap();

        let tables = aggregate(&conc);
        assert_eq!(tables.mean.column("Alanine").unwrap().values, vec![None]);
        assert_eq!(tables.std.column("Alanine").unwrap().values, vec![None]);
    }

    #[test]
    fn test_groups_split_on_condition_and_time_point() {
        let mut conc = Table::new(vec![
            key("ctrl", "T0", 1, 1),
            key("ctrl", "T1", 1, 2),
            key("treated", "T0", 1, 3),
        ]);
        conc.push_column("Alanine", vec![Some(1.0), Some(2.0), Some(3.0)])
            .unwrap();

        let tables = aggregate(&conc);
        assert_eq!(tables.mean.n_rows(), 3);
        assert_eq!(
            tables.mean.index()[1],
            GroupKey {
                condition: "ctrl".into(),
                time_point: "T1".into()
            }
        );
        // Column set is preserved even across multiple groups.
        assert_eq!(
            tables.std.column_names().collect::<Vec<_>>(),
            vec!["Alanine"]
        );
    }
}
