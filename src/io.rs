//! # Input Loading and Export
//!
//! CSV/TSV loaders for the three input tables and CSV writers for the output
//! tables. Header matching is tolerant (lowercased, trimmed, substring-based)
//! because integration software and spreadsheet round-trips disagree on exact
//! header spelling; values are parsed strictly.
//!
//! The field separator is sniffed from the header line: tab first, then `;`.
//! `.tsv` files are always read as tab-separated. Spreadsheet formats such as
//! `.xlsx` are not supported and fail with [`LoadError::UnsupportedFormat`].

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use log::{debug, info};
use serde::Serialize;

use crate::reference::{normalize_decimal_separator, ProtonReference};
use crate::table::{
    GroupKey, MetadataRecord, MetadataTable, SampleKey, SpectralDataset, SpectrumId, Table,
    TableError,
};

/// Errors raised while loading input tables.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// I/O error reading an input file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// File extension without a supported loader (e.g. `.xlsx`).
    #[error("unsupported input format {0:?}; supported formats: .csv, .tsv")]
    UnsupportedFormat(String),

    /// A required column is absent from the header.
    #[error("missing required column: {0}")]
    MissingColumn(String),

    /// The file content violates the expected layout.
    #[error("invalid input format: {0}")]
    InvalidFormat(String),

    /// A cell could not be parsed as a number.
    #[error("invalid numeric value {value:?} in column {column:?}")]
    InvalidNumber {
        /// Column the cell belongs to.
        column: String,
        /// Raw cell content.
        value: String,
    },

    /// A proton count was not a positive number.
    #[error("proton count for {metabolite:?} must be positive, got {value:?}")]
    InvalidProtonCount {
        /// Metabolite the count belongs to.
        metabolite: String,
        /// Raw cell content.
        value: String,
    },

    /// Structural error while assembling the table.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Sniff the field separator from the header line: tab, then `;`.
fn sniff_delimiter(header: &str) -> Result<u8, LoadError> {
    if header.contains('\t') {
        Ok(b'\t')
    } else if header.contains(';') {
        Ok(b';')
    } else {
        Err(LoadError::InvalidFormat(
            "expected ';' or tab field separator".to_string(),
        ))
    }
}

/// Open a delimited text file, sniffing the separator from its header.
fn open_delimited(path: &Path) -> Result<(BufReader<File>, u8), LoadError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();
    match extension.as_str() {
        "tsv" => Ok((BufReader::new(File::open(path)?), b'\t')),
        "csv" => {
            let mut reader = BufReader::new(File::open(path)?);
            let mut header = String::new();
            reader.read_line(&mut header)?;
            let delimiter = sniff_delimiter(&header)?;
            // Re-open so the csv reader sees the header line again.
            Ok((BufReader::new(File::open(path)?), delimiter))
        }
        other => Err(LoadError::UnsupportedFormat(format!(".{other}"))),
    }
}

fn csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

fn normalized_headers<R: Read>(
    reader: &mut csv::Reader<R>,
) -> Result<Vec<String>, LoadError> {
    Ok(reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect())
}

fn find_header(headers: &[String], needle: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.to_lowercase().contains(needle))
}

fn cell<'a>(record: &'a csv::StringRecord, idx: usize) -> &'a str {
    record.get(idx).unwrap_or("").trim()
}

fn parse_spectrum_id(raw: &str, column: &str) -> Result<SpectrumId, LoadError> {
    raw.parse::<SpectrumId>()
        .map_err(|_| LoadError::InvalidNumber {
            column: column.to_string(),
            value: raw.to_string(),
        })
}

/// Load the spectral dataset from a `.csv`/`.tsv` file.
///
/// One integer spectrum-id column (any header containing "spectrum"), one
/// numeric column per metabolite. Columns listed in `ignore` (e.g. the TSP
/// chemical-shift reference peak) are skipped entirely. Empty cells are
/// missing values.
pub fn load_spectral_data(path: &Path, ignore: &[String]) -> Result<SpectralDataset, LoadError> {
    let (reader, delimiter) = open_delimited(path)?;
    let dataset = spectral_data_from_reader(reader, delimiter, ignore)?;
    info!(
        "loaded {} spectra with {} metabolite column(s) from {}",
        dataset.n_spectra(),
        dataset.metabolites().len(),
        path.display()
    );
    Ok(dataset)
}

/// Parse a spectral dataset from any reader. See [`load_spectral_data`].
pub fn spectral_data_from_reader<R: Read>(
    reader: R,
    delimiter: u8,
    ignore: &[String],
) -> Result<SpectralDataset, LoadError> {
    let mut csv_reader = csv_reader(reader, delimiter);
    let headers = normalized_headers(&mut csv_reader)?;

    let id_column =
        find_header(&headers, "spectrum").ok_or_else(|| LoadError::MissingColumn("spectrum id".into()))?;
    let metabolite_columns: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(idx, header)| {
            *idx != id_column && !ignore.iter().any(|skip| skip == header.as_str())
        })
        .map(|(idx, _)| idx)
        .collect();
    for skipped in ignore {
        if headers.iter().any(|header| header == skipped) {
            debug!("ignoring column {skipped:?}");
        }
    }

    let mut dataset = SpectralDataset::new(
        metabolite_columns
            .iter()
            .map(|&idx| headers[idx].clone())
            .collect(),
    );

    for record in csv_reader.records() {
        let record = record?;
        let id = parse_spectrum_id(cell(&record, id_column), &headers[id_column])?;
        let intensities = metabolite_columns
            .iter()
            .map(|&idx| {
                let raw = cell(&record, idx);
                if raw.is_empty() {
                    Ok(None)
                } else {
                    raw.parse::<f64>()
                        .map(Some)
                        .map_err(|_| LoadError::InvalidNumber {
                            column: headers[idx].clone(),
                            value: raw.to_string(),
                        })
                }
            })
            .collect::<Result<Vec<_>, LoadError>>()?;
        dataset.push_spectrum(id, intensities)?;
    }

    Ok(dataset)
}

/// Load the experiment metadata table from a `.csv`/`.tsv` file.
///
/// Required columns (tolerant match): Conditions, Time_Points, Replicates and
/// the spectrum id.
pub fn load_metadata(path: &Path) -> Result<MetadataTable, LoadError> {
    let (reader, delimiter) = open_delimited(path)?;
    let metadata = metadata_from_reader(reader, delimiter)?;
    info!("loaded {} metadata rows from {}", metadata.n_rows(), path.display());
    Ok(metadata)
}

/// Parse a metadata table from any reader. See [`load_metadata`].
pub fn metadata_from_reader<R: Read>(
    reader: R,
    delimiter: u8,
) -> Result<MetadataTable, LoadError> {
    let mut csv_reader = csv_reader(reader, delimiter);
    let headers = normalized_headers(&mut csv_reader)?;

    let condition_column = find_header(&headers, "condition")
        .ok_or_else(|| LoadError::MissingColumn("Conditions".into()))?;
    let time_column = find_header(&headers, "time")
        .ok_or_else(|| LoadError::MissingColumn("Time_Points".into()))?;
    let replicate_column = find_header(&headers, "replicate")
        .ok_or_else(|| LoadError::MissingColumn("Replicates".into()))?;
    let id_column = find_header(&headers, "spectrum")
        .ok_or_else(|| LoadError::MissingColumn("spectrum id".into()))?;

    let mut metadata = MetadataTable::new();
    for record in csv_reader.records() {
        let record = record?;
        let id = parse_spectrum_id(cell(&record, id_column), &headers[id_column])?;

        let condition = cell(&record, condition_column);
        let time_point = cell(&record, time_column);
        if condition.is_empty() || time_point.is_empty() {
            return Err(LoadError::InvalidFormat(format!(
                "empty condition or time point for spectrum {id}; \
                 fill in the metadata template before loading it"
            )));
        }
        let replicate_raw = cell(&record, replicate_column);
        let replicate =
            replicate_raw
                .parse::<u32>()
                .map_err(|_| LoadError::InvalidNumber {
                    column: headers[replicate_column].clone(),
                    value: replicate_raw.to_string(),
                })?;

        metadata.push_record(
            id,
            MetadataRecord {
                condition: condition.to_string(),
                time_point: time_point.to_string(),
                replicate,
            },
        )?;
    }

    Ok(metadata)
}

/// Load the proton reference table from a `.csv`/`.tsv` file.
///
/// Required columns: Metabolite and Heq. Heq accepts `.` or `,` as the
/// decimal separator and must be positive.
pub fn load_proton_reference(path: &Path) -> Result<ProtonReference, LoadError> {
    let (reader, delimiter) = open_delimited(path)?;
    let reference = reference_from_reader(reader, delimiter)?;
    info!(
        "loaded {} proton reference entries from {}",
        reference.len(),
        path.display()
    );
    Ok(reference)
}

/// Parse a proton reference table from any reader. See
/// [`load_proton_reference`].
pub fn reference_from_reader<R: Read>(
    reader: R,
    delimiter: u8,
) -> Result<ProtonReference, LoadError> {
    let mut csv_reader = csv_reader(reader, delimiter);
    let headers = normalized_headers(&mut csv_reader)?;

    let metabolite_column = find_header(&headers, "metabolite")
        .ok_or_else(|| LoadError::MissingColumn("Metabolite".into()))?;
    let heq_column =
        find_header(&headers, "heq").ok_or_else(|| LoadError::MissingColumn("Heq".into()))?;

    let mut reference = ProtonReference::new();
    for record in csv_reader.records() {
        let record = record?;
        let metabolite = cell(&record, metabolite_column);
        if metabolite.is_empty() {
            continue;
        }
        let raw = cell(&record, heq_column);
        let heq = normalize_decimal_separator(raw)
            .parse::<f64>()
            .map_err(|_| LoadError::InvalidNumber {
                column: headers[heq_column].clone(),
                value: raw.to_string(),
            })?;
        if !(heq.is_finite() && heq > 0.0) {
            return Err(LoadError::InvalidProtonCount {
                metabolite: metabolite.to_string(),
                value: raw.to_string(),
            });
        }
        reference.push(metabolite, heq);
    }

    Ok(reference)
}

/// Delimiter used for every exported table.
pub const EXPORT_DELIMITER: u8 = b';';

fn format_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write a per-sample table (merged, resolved or concentrations) as CSV.
/// Missing cells are written empty.
pub fn write_sample_table<W: Write>(
    writer: W,
    table: &Table<SampleKey>,
) -> Result<(), LoadError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(EXPORT_DELIMITER)
        .from_writer(writer);

    let mut header = vec![
        "Conditions".to_string(),
        "Time_Points".to_string(),
        "Replicates".to_string(),
        "Spectrum".to_string(),
    ];
    header.extend(table.column_names().map(str::to_string));
    csv_writer.write_record(&header)?;

    for (row, key) in table.index().iter().enumerate() {
        let mut record = vec![
            key.condition.clone(),
            key.time_point.clone(),
            key.replicate.to_string(),
            key.spectrum_id.to_string(),
        ];
        record.extend(table.columns().iter().map(|c| format_cell(c.values[row])));
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write an aggregated table (means or standard deviations) as CSV.
pub fn write_group_table<W: Write>(writer: W, table: &Table<GroupKey>) -> Result<(), LoadError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(EXPORT_DELIMITER)
        .from_writer(writer);

    let mut header = vec!["Conditions".to_string(), "Time_Points".to_string()];
    header.extend(table.column_names().map(str::to_string));
    csv_writer.write_record(&header)?;

    for (row, key) in table.index().iter().enumerate() {
        let mut record = vec![key.condition.clone(), key.time_point.clone()];
        record.extend(table.columns().iter().map(|c| format_cell(c.values[row])));
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write an empty metadata template with one row per spectrum id, for the
/// experimenter to fill in and load back with [`load_metadata`].
pub fn write_metadata_template<W: Write>(
    writer: W,
    spectrum_ids: impl Iterator<Item = SpectrumId>,
) -> Result<(), LoadError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(EXPORT_DELIMITER)
        .from_writer(writer);
    csv_writer.write_record(["Conditions", "Time_Points", "Replicates", "Spectrum"])?;
    for id in spectrum_ids {
        let id = id.to_string();
        csv_writer.write_record(["", "", "", id.as_str()])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Human-readable summary of one quantification run, exported as JSON next to
/// the CSV tables.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Number of spectra in the input dataset.
    pub spectra: usize,
    /// Canonical metabolite names after resolution.
    pub metabolites: Vec<String>,
    /// Distinct condition labels.
    pub conditions: Vec<String>,
    /// Distinct time point labels.
    pub time_points: Vec<String>,
    /// Dilution factor applied to every intensity.
    pub dilution_factor: f64,
    /// Standard column name when external calibration was used.
    pub external_standard: Option<String>,
    /// Whether replicate means/stds were computed.
    pub aggregated: bool,
}

impl RunSummary {
    /// Serialize the summary as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE_DATA: &str = "\
Spectrum;Glucose 1;Glucose 2;Lactate
1;2.0;3.0;7.5
2;4.0;;0.0
";

    const SAMPLE_METADATA: &str = "\
Conditions;Time_Points;Replicates;Spectrum
ctrl;T0;1;1
ctrl;T0;2;2
";

    const SAMPLE_REFERENCE: &str = "\
Metabolite;Heq
Glucose 1;1
Glucose 2;1,0
Lactate;3.0
";

    #[test]
    fn test_spectral_data_parsing() {
        let dataset =
            spectral_data_from_reader(Cursor::new(SAMPLE_DATA), b';', &[]).unwrap();
        assert_eq!(dataset.n_spectra(), 2);
        assert_eq!(
            dataset.metabolites(),
            &["Glucose 1", "Glucose 2", "Lactate"]
        );
        assert_eq!(dataset.intensities(2).unwrap()[1], None);
        // Raw zeros survive loading; the merge rewrites them to missing.
        assert_eq!(dataset.intensities(2).unwrap()[2], Some(0.0));
    }

    #[test]
    fn test_ignored_columns_are_skipped() {
        let data = "Spectrum;TSP;Alanine\n1;9.0;2.0\n";
        let dataset =
            spectral_data_from_reader(Cursor::new(data), b';', &["TSP".to_string()]).unwrap();
        assert_eq!(dataset.metabolites(), &["Alanine"]);
    }

    #[test]
    fn test_metadata_parsing() {
        let metadata = metadata_from_reader(Cursor::new(SAMPLE_METADATA), b';').unwrap();
        assert_eq!(metadata.n_rows(), 2);
        let record = metadata.record(2).unwrap();
        assert_eq!(record.condition, "ctrl");
        assert_eq!(record.replicate, 2);
    }

    #[test]
    fn test_unfilled_metadata_template_rejected() {
        let data = "Conditions;Time_Points;Replicates;Spectrum\n;;1;1\n";
        let err = metadata_from_reader(Cursor::new(data), b';').unwrap_err();
        assert!(matches!(err, LoadError::InvalidFormat(_)));
    }

    #[test]
    fn test_reference_parsing_accepts_decimal_comma() {
        let reference = reference_from_reader(Cursor::new(SAMPLE_REFERENCE), b';').unwrap();
        assert_eq!(reference.proton_count("Glucose 2"), Some(1.0));
        assert_eq!(reference.proton_count("Lactate"), Some(3.0));
    }

    #[test]
    fn test_non_positive_proton_count_rejected() {
        let data = "Metabolite;Heq\nAlanine;0\n";
        let err = reference_from_reader(Cursor::new(data), b';').unwrap_err();
        assert!(matches!(err, LoadError::InvalidProtonCount { .. }));
    }

    #[test]
    fn test_missing_required_column() {
        let data = "Metabolite;Protons\nAlanine;3\n";
        let err = reference_from_reader(Cursor::new(data), b';').unwrap_err();
        match err {
            LoadError::MissingColumn(column) => assert_eq!(column, "Heq"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c").unwrap(), b';');
        assert_eq!(sniff_delimiter("a\tb\tc").unwrap(), b'\t');
        assert!(sniff_delimiter("a,b,c").is_err());
    }

    #[test]
    fn test_sample_table_export_round_trip() {
        let mut table = Table::new(vec![SampleKey {
            condition: "ctrl".into(),
            time_point: "T0".into(),
            replicate: 1,
            spectrum_id: 1,
        }]);
        table.push_column("Alanine", vec![None]).unwrap();
        table.push_column("Lactate", vec![Some(2.5)]).unwrap();

        let mut out = Vec::new();
        write_sample_table(&mut out, &table).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Conditions;Time_Points;Replicates;Spectrum;Alanine;Lactate"));
        assert!(text.contains("ctrl;T0;1;1;;2.5"));
    }

    #[test]
    fn test_metadata_template_layout() {
        let mut out = Vec::new();
        write_metadata_template(&mut out, [1, 2, 3].into_iter()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], ";;;1");
    }
}
