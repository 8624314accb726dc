use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Error, Result};

// ---------------------------------------------------------------------------
// HeaderMap – key/value pairs from a header file
// ---------------------------------------------------------------------------

/// Parsed header file: string keys to string values (`starttime`, `delta`,
/// `samplerate`, `network`, `station`, ...).
pub type HeaderMap = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Matrix – samples × traces
// ---------------------------------------------------------------------------

/// A 2-D array of samples, one column per trace.
///
/// All columns share the same length; column order is trace order.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    columns: Vec<Vec<f64>>,
}

impl Matrix {
    /// Build from trace columns. Ragged input is rejected.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self> {
        let rows = columns.first().map_or(0, Vec::len);
        if let Some((i, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
            return Err(invalid(format!(
                "column {i} has {} samples but column 0 has {rows}",
                col.len()
            )));
        }
        Ok(Self { rows, columns })
    }

    /// Build from sample rows (each row holds one value per trace).
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        let mut columns = vec![Vec::with_capacity(rows.len()); width];
        for (r, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(invalid(format!(
                    "row {r} has {} values but row 0 has {width}",
                    row.len()
                )));
            }
            for (col, &v) in columns.iter_mut().zip(row) {
                col.push(v);
            }
        }
        Ok(Self {
            rows: rows.len(),
            columns,
        })
    }

    /// Number of samples per trace.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of traces.
    pub fn traces(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Value at (sample, trace).
    pub fn get(&self, row: usize, trace: usize) -> f64 {
        self.columns[trace][row]
    }
}

// ---------------------------------------------------------------------------
// Trace – one channel with metadata
// ---------------------------------------------------------------------------

/// Per-trace metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceStats {
    /// Sample interval in seconds.
    pub delta: Option<f64>,
    /// ISO-8601 start time kept as text.
    pub starttime: Option<String>,
    pub network: Option<String>,
    pub station: Option<String>,
    pub channel: String,
}

impl TraceStats {
    /// Sampling rate in Hz; 1 Hz when the interval is unknown.
    pub fn sampling_rate(&self) -> f64 {
        match self.delta {
            Some(d) if d > 0.0 => 1.0 / d,
            _ => 1.0,
        }
    }

    /// Sampling rate only when the interval is actually recorded.
    pub fn known_sampling_rate(&self) -> Option<f64> {
        self.delta.filter(|d| *d > 0.0).map(|d| 1.0 / d)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub stats: TraceStats,
    pub data: Vec<f64>,
}

impl Trace {
    pub fn new(data: Vec<f64>, stats: TraceStats) -> Self {
        Self { stats, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same metadata, new samples.
    pub fn with_data(&self, data: Vec<f64>) -> Self {
        Self {
            stats: self.stats.clone(),
            data,
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}..{} | {} | {} Hz, {} samples",
            self.stats.network.as_deref().unwrap_or(""),
            self.stats.station.as_deref().unwrap_or(""),
            self.stats.channel,
            self.stats.starttime.as_deref().unwrap_or("<no starttime>"),
            self.stats.sampling_rate(),
            self.data.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Waveform – ordered set of traces
// ---------------------------------------------------------------------------

/// An ordered collection of traces; insertion order is channel order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    pub traces: Vec<Trace>,
}

impl Waveform {
    pub fn new(traces: Vec<Trace>) -> Self {
        Self { traces }
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.traces.iter()
    }

    /// Apply `f` to every trace's samples, keeping metadata.
    pub fn map_traces<F>(&self, mut f: F) -> Result<Waveform>
    where
        F: FnMut(&Trace) -> Result<Vec<f64>>,
    {
        let traces = self
            .traces
            .iter()
            .map(|tr| f(tr).map(|data| tr.with_data(data)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Waveform { traces })
    }

    /// Build a waveform from a matrix, one trace per column, using header
    /// fields for timing and station metadata.
    ///
    /// `delta` (seconds) wins over `samplerate` (Hz). Channels are labelled
    /// `01`, `02`, ... in column order.
    pub fn from_matrix(matrix: &Matrix, header: &HeaderMap) -> Result<Self> {
        let starttime = ["starttime", "start_time", "StartTime"]
            .iter()
            .find_map(|k| header.get(*k))
            .cloned();

        let delta = if let Some(raw) = header.get("delta") {
            let d: f64 = raw.parse().map_err(|_| {
                Error::InvalidFormat(format!("header delta is not a number: {raw}"))
            })?;
            Some(d)
        } else if let Some(raw) = header.get("samplerate") {
            let fs: f64 = raw.parse().map_err(|_| {
                Error::InvalidFormat(format!("header samplerate is not a number: {raw}"))
            })?;
            if !(fs > 0.0 && fs.is_finite()) {
                return Err(Error::InvalidFormat(format!(
                    "sample rate must be positive, got {fs}"
                )));
            }
            Some(1.0 / fs)
        } else {
            None
        };
        if let Some(d) = delta {
            check_delta(d)?;
        }

        let non_empty = |key: &str| header.get(key).filter(|v| !v.is_empty()).cloned();
        let network = non_empty("network");
        let station = non_empty("station");

        let traces = matrix
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                Trace::new(
                    col.clone(),
                    TraceStats {
                        delta,
                        starttime: starttime.clone(),
                        network: network.clone(),
                        station: station.clone(),
                        channel: format!("{:02}", i + 1),
                    },
                )
            })
            .collect();
        Ok(Waveform { traces })
    }

    /// Reject traces whose recorded sample interval is not a positive number.
    pub fn validate(&self) -> Result<()> {
        self.traces
            .iter()
            .filter_map(|tr| tr.stats.delta)
            .try_for_each(check_delta)
    }

    /// Stack traces as matrix columns, truncated to the shortest trace.
    pub fn to_matrix(&self) -> Matrix {
        let min_len = self.traces.iter().map(Trace::len).min().unwrap_or(0);
        let columns = self
            .traces
            .iter()
            .map(|tr| tr.data[..min_len].to_vec())
            .collect();
        Matrix {
            rows: min_len,
            columns,
        }
    }
}

fn check_delta(d: f64) -> Result<()> {
    if d > 0.0 && d.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidFormat(format!(
            "sample interval must be positive, got {d}"
        )))
    }
}

impl<'a> IntoIterator for &'a Waveform {
    type Item = &'a Trace;
    type IntoIter = std::slice::Iter<'a, Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.iter()
    }
}
