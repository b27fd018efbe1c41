//! Output of accepted steps.
//!
//! The controller records one row per accepted step in a
//! [`StatisticsTable`] and hands it, together with the fields' data
//! vectors, to an [`OutputSink`]. On-disk visualization formats belong
//! to sinks outside this crate; [`StatisticsFileSink`] only writes the
//! statistics table as text.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use stagger_field::FieldOutput;

// ── OutputError ────────────────────────────────────────────────────

/// Errors raised by an [`OutputSink`].
#[derive(Debug)]
pub enum OutputError {
    /// Writing to `path` failed.
    Io {
        /// File or directory being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "writing {}: {source}", path.display()),
        }
    }
}

impl Error for OutputError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ── StatisticsTable ────────────────────────────────────────────────

/// One entry of a [`StatisticsTable`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TableValue {
    /// Printed without a fractional part, whatever the column format.
    Integer(u64),
    /// Printed according to the column's [`ColumnFormat`].
    Float(f64),
}

impl From<u64> for TableValue {
    fn from(v: u64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for TableValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Number format of a table column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnFormat {
    /// Fixed-point with `precision` decimals.
    Fixed {
        /// Digits after the decimal point.
        precision: usize,
    },
    /// Scientific with `precision` decimals in the mantissa.
    Scientific {
        /// Digits after the decimal point.
        precision: usize,
    },
}

impl Default for ColumnFormat {
    fn default() -> Self {
        Self::Fixed { precision: 4 }
    }
}

impl ColumnFormat {
    fn render(self, value: TableValue) -> String {
        match (value, self) {
            (TableValue::Integer(v), _) => v.to_string(),
            (TableValue::Float(v), Self::Fixed { precision }) => format!("{v:.precision$}"),
            (TableValue::Float(v), Self::Scientific { precision }) => format!("{v:.precision$e}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Column {
    format: ColumnFormat,
    values: Vec<TableValue>,
}

/// Running table of per-step statistics, one column per quantity.
///
/// Columns keep their insertion order. Rows are aligned by index; a
/// column that missed a row is printed as `-` there.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatisticsTable {
    columns: IndexMap<String, Column>,
}

impl StatisticsTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to column `name`, creating the column if needed.
    pub fn add_value(&mut self, name: &str, value: impl Into<TableValue>) {
        self.columns
            .entry(name.to_string())
            .or_default()
            .values
            .push(value.into());
    }

    /// Set the number format of column `name`, creating the column if needed.
    pub fn set_format(&mut self, name: &str, format: ColumnFormat) {
        self.columns.entry(name.to_string()).or_default().format = format;
    }

    /// Values of column `name`.
    pub fn column(&self, name: &str) -> Option<&[TableValue]> {
        self.columns.get(name).map(|c| c.values.as_slice())
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of rows (length of the longest column).
    pub fn n_rows(&self) -> usize {
        self.columns
            .values()
            .map(|c| c.values.len())
            .max()
            .unwrap_or(0)
    }

    /// Write the table as whitespace-separated text with a header line.
    pub fn write_text(&self, out: &mut dyn Write) -> io::Result<()> {
        let names: Vec<&str> = self.column_names().collect();
        writeln!(out, "{}", names.join(" "))?;
        for row in 0..self.n_rows() {
            let cells: Vec<String> = self
                .columns
                .values()
                .map(|c| match c.values.get(row) {
                    Some(&v) => c.format.render(v),
                    None => "-".to_string(),
                })
                .collect();
            writeln!(out, "{}", cells.join(" "))?;
        }
        Ok(())
    }
}

// ── OutputSink ─────────────────────────────────────────────────────

/// Everything handed to a sink for one accepted step.
#[derive(Clone, Copy, Debug)]
pub struct StepOutput<'a> {
    /// Number of the accepted step.
    pub step: u64,
    /// Simulation time at the end of the step.
    pub time: f64,
    /// Rank producing this output.
    pub rank: usize,
    /// Per-cell and per-DOF data vectors, including `subdomain`.
    pub fields: &'a FieldOutput,
    /// The statistics table including this step's row.
    pub statistics: &'a StatisticsTable,
}

/// Receives the output of every accepted step.
pub trait OutputSink: Send {
    /// Persist or forward one accepted step.
    fn write_step(&mut self, output: &StepOutput<'_>) -> Result<(), OutputError>;

    /// Called once after the last step.
    fn finish(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// One step as retained by [`MemorySink`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedStep {
    /// Number of the accepted step.
    pub step: u64,
    /// Simulation time at the end of the step.
    pub time: f64,
    /// The fields' data vectors.
    pub fields: FieldOutput,
}

#[derive(Debug, Default)]
struct MemoryLog {
    steps: Vec<RecordedStep>,
    statistics: StatisticsTable,
    finished: bool,
}

/// Sink keeping every step in memory.
///
/// Clones share the same log, so a clone kept by the caller observes
/// what the controller wrote through its boxed copy.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_log<R>(&self, f: impl FnOnce(&mut MemoryLog) -> R) -> R {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut log)
    }

    /// Steps recorded so far.
    pub fn steps(&self) -> Vec<RecordedStep> {
        self.with_log(|log| log.steps.clone())
    }

    /// The statistics table as of the last recorded step.
    pub fn statistics(&self) -> StatisticsTable {
        self.with_log(|log| log.statistics.clone())
    }

    /// Whether [`OutputSink::finish`] was called.
    pub fn is_finished(&self) -> bool {
        self.with_log(|log| log.finished)
    }
}

impl OutputSink for MemorySink {
    fn write_step(&mut self, output: &StepOutput<'_>) -> Result<(), OutputError> {
        self.with_log(|log| {
            log.steps.push(RecordedStep {
                step: output.step,
                time: output.time,
                fields: output.fields.clone(),
            });
            log.statistics = output.statistics.clone();
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        self.with_log(|log| log.finished = true);
        Ok(())
    }
}

/// Sink rewriting `<output_dir>/statistics.txt` after every step.
///
/// Only rank 0 writes; other ranks accept and drop their output.
#[derive(Clone, Debug)]
pub struct StatisticsFileSink {
    output_dir: PathBuf,
}

impl StatisticsFileSink {
    /// File name of the statistics table inside the output directory.
    pub const FILE_NAME: &'static str = "statistics.txt";

    /// Sink writing into `output_dir`, created on first write.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Full path of the statistics file.
    pub fn path(&self) -> PathBuf {
        self.output_dir.join(Self::FILE_NAME)
    }

    fn io_error(path: &Path) -> impl FnOnce(io::Error) -> OutputError + '_ {
        move |source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl OutputSink for StatisticsFileSink {
    fn write_step(&mut self, output: &StepOutput<'_>) -> Result<(), OutputError> {
        if output.rank != 0 {
            return Ok(());
        }
        fs::create_dir_all(&self.output_dir).map_err(Self::io_error(&self.output_dir))?;
        let path = self.path();
        let file = fs::File::create(&path).map_err(Self::io_error(&path))?;
        let mut writer = BufWriter::new(file);
        output
            .statistics
            .write_text(&mut writer)
            .and_then(|()| writer.flush())
            .map_err(Self::io_error(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_table() -> StatisticsTable {
        let mut table = StatisticsTable::new();
        for (step, time) in [(1u64, 0.1f64), (2, 0.2)] {
            table.add_value("Step", step);
            table.set_format("Step", ColumnFormat::Fixed { precision: 1 });
            table.add_value("Time", time);
            table.set_format("Time", ColumnFormat::Scientific { precision: 8 });
        }
        table
    }

    #[test]
    fn text_layout() {
        let mut buf = Vec::new();
        step_table().write_text(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "Step Time\n1 1.00000000e-1\n2 2.00000000e-1\n"
        );
    }

    #[test]
    fn fixed_precision_applies_to_floats() {
        let mut table = StatisticsTable::new();
        table.add_value("x", 0.26);
        table.set_format("x", ColumnFormat::Fixed { precision: 1 });
        let mut buf = Vec::new();
        table.write_text(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "x\n0.3\n");
    }

    #[test]
    fn ragged_columns_print_placeholder() {
        let mut table = StatisticsTable::new();
        table.add_value("a", 1u64);
        table.add_value("a", 2u64);
        table.add_value("b", 3u64);
        assert_eq!(table.n_rows(), 2);
        let mut buf = Vec::new();
        table.write_text(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a b\n1 3\n2 -\n");
    }

    #[test]
    fn memory_sink_clones_share_log() {
        let sink = MemorySink::new();
        let mut boxed: Box<dyn OutputSink> = Box::new(sink.clone());
        let fields = FieldOutput::new();
        let table = step_table();
        boxed
            .write_step(&StepOutput {
                step: 1,
                time: 0.1,
                rank: 0,
                fields: &fields,
                statistics: &table,
            })
            .unwrap();
        boxed.finish().unwrap();
        assert_eq!(sink.steps().len(), 1);
        assert_eq!(sink.statistics().n_rows(), 2);
        assert!(sink.is_finished());
    }

    #[test]
    fn statistics_file_written_by_root_only() {
        let dir = std::env::temp_dir().join(format!("stagger-stats-{}", std::process::id()));
        let fields = FieldOutput::new();
        let table = step_table();
        let output = StepOutput {
            step: 2,
            time: 0.2,
            rank: 1,
            fields: &fields,
            statistics: &table,
        };

        let mut sink = StatisticsFileSink::new(&dir);
        sink.write_step(&output).unwrap();
        assert!(!sink.path().exists());

        sink.write_step(&StepOutput { rank: 0, ..output }).unwrap();
        let text = fs::read_to_string(sink.path()).unwrap();
        assert!(text.starts_with("Step Time\n"));
        assert_eq!(text.lines().count(), 3);

        fs::remove_dir_all(&dir).unwrap();
    }
}
