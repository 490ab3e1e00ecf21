//! Integration tests for the quantification pipeline.
//!
//! These tests drive the full flow from CSV input to exported tables.

use std::io::Cursor;

use nmrquant::io::{
    load_metadata, load_proton_reference, load_spectral_data, metadata_from_reader,
    reference_from_reader, spectral_data_from_reader, write_metadata_template,
    write_sample_table,
};
use nmrquant::pipeline::{ExternalStandard, PipelineConfig, Quantifier};
use nmrquant::resolve::ResolveOutcome;

const DATA: &str = "\
Spectrum;Glucose 1;Glucose 2;Phenylalanine 1;Phenylalanine 2;Isoleucine+Leucine;Alanine;Strd
1;2.0;3.0;1.0;1.0;9.0;10.0;100.0
2;4.0;6.0;;2.0;9.0;12.0;100.0
3;1.0;1.0;0.0;0.0;9.0;0.0;100.0
4;2.0;2.0;1.5;0.5;9.0;8.0;100.0
";

const METADATA: &str = "\
Conditions;Time_Points;Replicates;Spectrum
control;T0;1;1
control;T0;2;2
treated;T0;1;3
treated;T0;2;4
";

const REFERENCE: &str = "\
Metabolite;Heq
Glucose 1;1
Glucose 2;1
Phenylalanine 1;2,0
Phenylalanine 2;2,0
Isoleucine+Leucine;9
Alanine;2
Strd;9
";

fn loaded_quantifier(config: PipelineConfig) -> Quantifier {
    let data = spectral_data_from_reader(Cursor::new(DATA), b';', &[]).unwrap();
    let metadata = metadata_from_reader(Cursor::new(METADATA), b';').unwrap();
    let reference = reference_from_reader(Cursor::new(REFERENCE), b';').unwrap();
    let mut quantifier = Quantifier::new(config).unwrap();
    quantifier.load(data, metadata, reference);
    quantifier
}

#[test]
fn test_full_run_with_aggregation() {
    let mut config = PipelineConfig::new(5.0);
    config.compute_mean = true;
    let mut quantifier = loaded_quantifier(config);
    quantifier.run().unwrap();

    // Merge: zeros became missing.
    let merged = quantifier.merged().unwrap();
    assert_eq!(merged.n_rows(), 4);
    let spectrum3 = merged
        .index()
        .iter()
        .position(|key| key.spectrum_id == 3)
        .unwrap();
    assert_eq!(merged.value(spectrum3, "Alanine"), None);

    // Resolution: split groups summed, composite dropped.
    let resolved = quantifier.resolved().unwrap();
    let names: Vec<&str> = resolved.column_names().collect();
    assert_eq!(
        names,
        vec!["Glucose", "Phenylalanine", "Alanine", "Strd"]
    );
    let spectrum2 = resolved
        .index()
        .iter()
        .position(|key| key.spectrum_id == 2)
        .unwrap();
    // One sub-peak missing: the sum equals the other value.
    assert_eq!(resolved.value(spectrum2, "Phenylalanine"), Some(2.0));
    // Both sub-peaks were zero: the sum stays missing.
    assert_eq!(resolved.value(spectrum3, "Phenylalanine"), None);

    // Reference normalization aligned names with the resolved columns.
    let reference = quantifier.normalized_reference().unwrap();
    assert_eq!(reference.proton_count("Glucose"), Some(2.0));
    assert_eq!(reference.proton_count("Phenylalanine"), Some(4.0));
    assert_eq!(reference.proton_count("Isoleucine+Leucine"), None);

    // Concentrations: intensity × dilution ÷ protons, missing propagated.
    let conc = quantifier.concentrations().unwrap();
    let spectrum1 = conc
        .index()
        .iter()
        .position(|key| key.spectrum_id == 1)
        .unwrap();
    assert_eq!(conc.value(spectrum1, "Glucose"), Some(12.5));
    assert_eq!(conc.value(spectrum1, "Alanine"), Some(25.0));
    assert_eq!(conc.value(spectrum3, "Alanine"), None);

    // Aggregation: control group Alanine = [25.0, 30.0].
    let means = quantifier.means().unwrap();
    let stds = quantifier.stds().unwrap();
    assert_eq!(means.n_rows(), 2);
    let control = means
        .index()
        .iter()
        .position(|key| key.condition == "control")
        .unwrap();
    assert_eq!(means.value(control, "Alanine"), Some(27.5));
    let std = stds.value(control, "Alanine").unwrap();
    assert!((std - 12.5_f64.sqrt()).abs() < 1e-12);

    // Treated group has one missing Alanine value, so a single-value sample
    // and a missing standard deviation.
    let treated = means
        .index()
        .iter()
        .position(|key| key.condition == "treated")
        .unwrap();
    assert_eq!(means.value(treated, "Alanine"), Some(20.0));
    assert_eq!(stds.value(treated, "Alanine"), None);
}

#[test]
fn test_external_standard_run_excludes_standard_column() {
    let mut config = PipelineConfig::new(5.0);
    config.external_standard = Some(ExternalStandard {
        column: "Strd".into(),
        concentration: Some(0.5),
    });
    let mut quantifier = loaded_quantifier(config);
    quantifier.run().unwrap();

    let conc = quantifier.concentrations().unwrap();
    assert!(conc.column("Strd").is_none());
    assert!(conc.column("Alanine").is_some());
}

#[test]
fn test_resolution_outcomes_are_reported() {
    let mut quantifier = loaded_quantifier(PipelineConfig::new(1.0));
    quantifier.merge_metadata().unwrap();
    let outcome = quantifier.resolve_columns().unwrap();
    assert_eq!(
        outcome,
        ResolveOutcome::Resolved {
            merged_groups: 2,
            dropped_composites: 1
        }
    );
    let outcome = quantifier.normalize_reference().unwrap();
    assert!(matches!(outcome, ResolveOutcome::Resolved { .. }));
}

#[test]
fn test_unknown_metabolite_aborts_run() {
    let data = spectral_data_from_reader(
        Cursor::new("Spectrum;Mystery\n1;2.0\n"),
        b';',
        &[],
    )
    .unwrap();
    let metadata = metadata_from_reader(
        Cursor::new("Conditions;Time_Points;Replicates;Spectrum\nctrl;T0;1;1\n"),
        b';',
    )
    .unwrap();
    let reference =
        reference_from_reader(Cursor::new("Metabolite;Heq\nAlanine;2\n"), b';').unwrap();

    let mut quantifier = Quantifier::new(PipelineConfig::new(1.0)).unwrap();
    quantifier.load(data, metadata, reference);
    let err = quantifier.run().unwrap_err();
    assert!(err.to_string().contains("Mystery"));
    assert!(quantifier.concentrations().is_none());
}

#[test]
fn test_mismatched_spectrum_ids_abort_merge() {
    let data = spectral_data_from_reader(
        Cursor::new("Spectrum;Alanine\n1;2.0\n5;3.0\n"),
        b';',
        &[],
    )
    .unwrap();
    let metadata = metadata_from_reader(
        Cursor::new("Conditions;Time_Points;Replicates;Spectrum\nctrl;T0;1;1\n"),
        b';',
    )
    .unwrap();
    let reference =
        reference_from_reader(Cursor::new("Metabolite;Heq\nAlanine;2\n"), b';').unwrap();

    let mut quantifier = Quantifier::new(PipelineConfig::new(1.0)).unwrap();
    quantifier.load(data, metadata, reference);
    let err = quantifier.run().unwrap_err();
    assert!(err.to_string().contains('5'));
}

#[test]
fn test_file_loading_and_template_round_trip() {
    let dir = tempfile::tempdir().unwrap();

    let data_path = dir.path().join("spectra.csv");
    std::fs::write(&data_path, DATA).unwrap();
    let metadata_path = dir.path().join("template.csv");
    std::fs::write(&metadata_path, METADATA).unwrap();
    let reference_path = dir.path().join("proton_db.csv");
    std::fs::write(&reference_path, REFERENCE).unwrap();

    let data = load_spectral_data(&data_path, &["Strd".to_string()]).unwrap();
    assert!(!data.metabolites().iter().any(|name| name == "Strd"));
    let metadata = load_metadata(&metadata_path).unwrap();
    assert_eq!(metadata.n_rows(), 4);
    let reference = load_proton_reference(&reference_path).unwrap();
    assert_eq!(reference.proton_count("Phenylalanine 1"), Some(2.0));

    // An empty template generated from the data has one row per spectrum.
    let template_path = dir.path().join("empty_template.csv");
    let file = std::fs::File::create(&template_path).unwrap();
    write_metadata_template(file, data.spectrum_ids()).unwrap();
    let template = std::fs::read_to_string(&template_path).unwrap();
    assert_eq!(template.lines().count(), 1 + data.n_spectra());
}

#[test]
fn test_tab_separated_input() {
    let data = "Spectrum\tAlanine\n1\t2.0\n";
    let dataset = spectral_data_from_reader(Cursor::new(data), b'\t', &[]).unwrap();
    assert_eq!(dataset.intensities(1).unwrap()[0], Some(2.0));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spectra.tsv");
    std::fs::write(&path, data).unwrap();
    let dataset = load_spectral_data(&path, &[]).unwrap();
    assert_eq!(dataset.n_spectra(), 1);
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spectra.xlsx");
    std::fs::write(&path, b"not a spreadsheet").unwrap();
    let err = load_spectral_data(&path, &[]).unwrap_err();
    assert!(err.to_string().contains(".xlsx"));
}

#[test]
fn test_exported_concentration_table_shape() {
    let mut quantifier = loaded_quantifier(PipelineConfig::new(2.0));
    quantifier.run().unwrap();

    let mut out = Vec::new();
    write_sample_table(&mut out, quantifier.concentrations().unwrap()).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("Conditions;Time_Points;Replicates;Spectrum;"));
    // Missing concentrations are exported as empty cells, never as 0.
    assert!(!lines.iter().any(|line| line.ends_with(";0")));
}
