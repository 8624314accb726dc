use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use arrow::array::{Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde_json::Value as JsonValue;

use super::model::{HeaderMap, Matrix};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a samples × traces matrix from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.txt` / `.dat` / `.asc` – whitespace-separated rows, one column per trace
/// * `.csv`     – comma-separated rows, optional non-numeric header row
/// * `.json`    – `[[row0...], [row1...], ...]` or a flat array (single trace)
/// * `.parquet` – one numeric column per trace
pub fn load_matrix(path: &Path) -> Result<Matrix> {
    if !path.is_file() {
        return Err(Error::NotFound(format!("data file {}", path.display())));
    }
    let ext = extension(path);

    let parsed = match ext.as_str() {
        "txt" | "dat" | "asc" | "" => load_text(path),
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "matrix file extension .{other}"
            )))
        }
    };
    let matrix = parsed.map_err(|e| Error::InvalidFormat(format!("{}: {e:#}", path.display())))?;
    if matrix.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "{}: no samples found",
            path.display()
        )));
    }
    debug!(
        "loaded {} samples x {} traces from {}",
        matrix.rows(),
        matrix.traces(),
        path.display()
    );
    Ok(matrix)
}

/// Write a matrix as text: one row per sample, `%.7e` values separated by a
/// single space.  Extension `.parquet` writes a Parquet file instead.
pub fn save_matrix(matrix: &Matrix, path: &Path) -> Result<()> {
    if matches!(extension(path).as_str(), "parquet" | "pq") {
        return save_parquet(matrix, path);
    }
    let mut out = BufWriter::new(File::create(path)?);
    let mut line = String::new();
    for row in 0..matrix.rows() {
        line.clear();
        for trace in 0..matrix.traces() {
            if trace > 0 {
                line.push(' ');
            }
            line.push_str(&format_scientific(matrix.get(row, trace)));
        }
        line.push('\n');
        out.write_all(line.as_bytes())?;
    }
    out.flush()?;
    info!(
        "wrote {} x {} matrix to {}",
        matrix.rows(),
        matrix.traces(),
        path.display()
    );
    Ok(())
}

/// Read a header file of `key: value` lines.
///
/// `key=value` and `key value` are accepted too; blank lines and `#`
/// comments are skipped, as are lines with no separator at all.
pub fn load_header(path: &Path) -> Result<HeaderMap> {
    if !path.is_file() {
        return Err(Error::NotFound(format!("header file {}", path.display())));
    }
    let text = std::fs::read_to_string(path)?;
    let header = parse_header(&text);
    if header.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "header file {} is empty or malformed",
            path.display()
        )));
    }
    Ok(header)
}

/// Parse header text; see [`load_header`].
pub fn parse_header(text: &str) -> HeaderMap {
    let mut header = HeaderMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let pair = line
            .split_once(':')
            .or_else(|| line.split_once('='))
            .or_else(|| line.split_once(char::is_whitespace));
        if let Some((k, v)) = pair {
            header.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    header
}

/// Format like C's `%.7e`: seven digits after the point and a signed,
/// at-least-two-digit exponent (`1.2345000e+03`).
pub fn format_scientific(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{v:.7e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Text loader
// ---------------------------------------------------------------------------

fn load_text(path: &Path) -> anyhow::Result<Matrix> {
    let text = std::fs::read_to_string(path).context("reading text matrix")?;
    let mut rows = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split_whitespace()
            .enumerate()
            .map(|(j, tok)| {
                tok.parse::<f64>().with_context(|| {
                    format!("line {}, column {j}: '{tok}' is not a number", line_no + 1)
                })
            })
            .collect::<anyhow::Result<Vec<f64>>>()?;
        rows.push(row);
    }
    Ok(Matrix::from_rows(&rows)?)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Comma-separated rows. A first record that does not parse as numbers is
/// taken to be a header and skipped.
fn load_csv(path: &Path) -> anyhow::Result<Matrix> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .context("opening CSV")?;

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let parsed: std::result::Result<Vec<f64>, _> =
            record.iter().map(str::parse::<f64>).collect();
        match parsed {
            Ok(row) => rows.push(row),
            Err(_) if row_no == 0 => {
                debug!("skipping CSV header row in {}", path.display());
            }
            Err(e) => bail!("CSV row {row_no}: {e}"),
        }
    }
    Ok(Matrix::from_rows(&rows)?)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON: an array of sample rows, or a flat array holding one trace.
///
/// ```json
/// [[0.1, 0.2, 0.3],
///  [0.4, 0.5, 0.6]]
/// ```
fn load_json(path: &Path) -> anyhow::Result<Matrix> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;
    let records = root.as_array().context("Expected top-level JSON array")?;

    if records.iter().all(JsonValue::is_number) {
        let col = records
            .iter()
            .enumerate()
            .map(|(i, v)| v.as_f64().with_context(|| format!("[{i}]: not a number")))
            .collect::<anyhow::Result<Vec<f64>>>()?;
        return Ok(Matrix::from_columns(vec![col])?);
    }

    let rows = records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            rec.as_array()
                .with_context(|| format!("Row {i} is not a JSON array"))?
                .iter()
                .enumerate()
                .map(|(j, v)| {
                    v.as_f64()
                        .with_context(|| format!("Row {i}, [{j}]: not a number"))
                })
                .collect::<anyhow::Result<Vec<f64>>>()
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Matrix::from_rows(&rows)?)
}

// ---------------------------------------------------------------------------
// Parquet loader / writer
// ---------------------------------------------------------------------------

/// Load a Parquet file holding one numeric column per trace.
///
/// Float64, Float32, Int32 and Int64 columns are read as traces, in schema
/// order; any other column is ignored. Nulls become NaN.
fn load_parquet(path: &Path) -> anyhow::Result<Matrix> {
    let file = File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Vec<Vec<f64>> = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let numeric: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| is_numeric(f.data_type()))
            .map(|(i, _)| i)
            .collect();
        if numeric.is_empty() {
            bail!("Parquet file has no numeric columns");
        }
        if columns.is_empty() {
            columns = vec![Vec::new(); numeric.len()];
        } else if columns.len() != numeric.len() {
            bail!(
                "record batches disagree on trace count ({} vs {})",
                columns.len(),
                numeric.len()
            );
        }

        for (trace, &col_idx) in numeric.iter().enumerate() {
            extend_f64(&mut columns[trace], batch.column(col_idx))
                .with_context(|| format!("column '{}'", schema.field(col_idx).name()))?;
        }
    }

    Ok(Matrix::from_columns(columns)?)
}

fn is_numeric(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Float64 | DataType::Float32 | DataType::Int32 | DataType::Int64
    )
}

fn extend_f64(out: &mut Vec<f64>, col: &ArrayRef) -> anyhow::Result<()> {
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<Float64Array>() {
        out.extend(arr.iter().map(|v| v.unwrap_or(f64::NAN)));
    } else if let Some(arr) = any.downcast_ref::<Float32Array>() {
        out.extend(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)));
    } else if let Some(arr) = any.downcast_ref::<Int32Array>() {
        out.extend(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)));
    } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
        out.extend(arr.iter().map(|v| v.map_or(f64::NAN, |x| x as f64)));
    } else {
        bail!("unsupported column type {:?}", col.data_type());
    }
    Ok(())
}

/// Write a matrix as Parquet, one Float64 column per trace named
/// `trace_01`, `trace_02`, ...
pub fn save_parquet(matrix: &Matrix, path: &Path) -> Result<()> {
    write_parquet(matrix, path)
        .map_err(|e| Error::InvalidFormat(format!("{}: {e:#}", path.display())))?;
    info!(
        "wrote {} x {} matrix to {}",
        matrix.rows(),
        matrix.traces(),
        path.display()
    );
    Ok(())
}

fn write_parquet(matrix: &Matrix, path: &Path) -> anyhow::Result<()> {
    let fields: Vec<Field> = (0..matrix.traces())
        .map(|i| Field::new(format!("trace_{:02}", i + 1), DataType::Float64, false))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let arrays: Vec<ArrayRef> = matrix
        .columns()
        .iter()
        .map(|col| Arc::new(Float64Array::from(col.clone())) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scientific_format_matches_printf() {
        assert_eq!(format_scientific(1234.5), "1.2345000e+03");
        assert_eq!(format_scientific(-0.00012), "-1.2000000e-04");
        assert_eq!(format_scientific(0.0), "0.0000000e+00");
        assert_eq!(format_scientific(1e150), "1.0000000e+150");
        assert_eq!(format_scientific(f64::NAN), "nan");
    }

    #[test]
    fn header_accepts_all_separators() {
        let h = parse_header(
            "# acquisition\nstarttime: 2023-08-08T01:24:14.732\ndelta=0.001\n\nnetwork FO\nbogus\n",
        );
        assert_eq!(h.len(), 3);
        assert_eq!(h["starttime"], "2023-08-08T01:24:14.732");
        assert_eq!(h["delta"], "0.001");
        assert_eq!(h["network"], "FO");
    }

    #[test]
    fn missing_header_file_is_not_found() {
        let err = load_header(Path::new("/definitely/not/here/head.txt")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn text_round_trip_keeps_seven_digits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.txt");
        let m = Matrix::from_columns(vec![vec![1.0, -2.5e-7, 3.14159265], vec![0.0, 1e5, -7.0]])
            .unwrap();
        save_matrix(&m, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next().unwrap(), "1.0000000e+00 0.0000000e+00");

        let back = load_matrix(&path).unwrap();
        assert_eq!(back.shape(), (3, 2));
        approx::assert_relative_eq!(back.get(2, 0), 3.1415927, max_relative = 1e-9);
    }

    #[test]
    fn single_column_text_is_one_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.txt");
        std::fs::write(&path, "1\n2\n3\n").unwrap();
        let m = load_matrix(&path).unwrap();
        assert_eq!(m.shape(), (3, 1));
    }

    #[test]
    fn ragged_text_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "1 2\n3\n").unwrap();
        assert!(matches!(load_matrix(&path), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn csv_header_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        std::fs::write(&path, "ch1,ch2\n1.0,2.0\n3.0,4.0\n").unwrap();
        let m = load_matrix(&path).unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m.column(1), &[2.0, 4.0]);
    }

    #[test]
    fn csv_text_after_the_first_row_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        std::fs::write(&path, "1.0,2.0\n3.0,oops\n").unwrap();
        assert!(matches!(load_matrix(&path), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn json_rows_and_flat_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let rows = dir.path().join("rows.json");
        std::fs::write(&rows, "[[1, 2], [3, 4], [5, 6]]").unwrap();
        assert_eq!(load_matrix(&rows).unwrap().shape(), (3, 2));

        let flat = dir.path().join("flat.json");
        std::fs::write(&flat, "[1.5, 2.5]").unwrap();
        assert_eq!(load_matrix(&flat).unwrap().shape(), (2, 1));
    }

    #[test]
    fn parquet_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.parquet");
        let m = Matrix::from_columns(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        save_matrix(&m, &path).unwrap();
        assert_eq!(load_matrix(&path).unwrap(), m);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.xyz");
        std::fs::write(&path, "1 2").unwrap();
        assert!(matches!(load_matrix(&path), Err(Error::UnsupportedFormat(_))));
    }
}
