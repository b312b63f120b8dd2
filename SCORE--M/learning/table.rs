use std::{
    fs,
    io::Read,
    path::Path,
};

use thiserror::Error;

/// Errors raised while reading, writing, or addressing tables.
#[derive(Debug, Error)]
pub enum TableError {
    /// CSV parsing or writing failure (includes ragged rows).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Input had no header row.
    #[error("table has no header row")]
    MissingHeader,
    /// A requested column is not present.
    #[error("missing column `{0}`")]
    MissingColumn(String),
    /// A row does not match the header width.
    #[error("row {row} has {got} cells but the header has {expected}")]
    RaggedRow {
        /// Zero-based row index.
        row: usize,
        /// Cells found.
        got: usize,
        /// Header width.
        expected: usize,
    },
    /// A cell in a numeric column failed to parse.
    #[error("column `{column}` row {row}: expected a number, got `{value}`")]
    NotNumeric {
        /// Column name.
        column: String,
        /// Zero-based row index.
        row: usize,
        /// Offending cell.
        value: String,
    },
}

/// Returns true for cells treated as missing values.
#[must_use]
pub fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty()
        || cell.eq_ignore_ascii_case("na")
        || cell.eq_ignore_ascii_case("nan")
        || cell.eq_ignore_ascii_case("null")
}

/// String-celled table with a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates an empty table with the given header.
    #[must_use]
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Builds a table, validating every row width.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TableError> {
        let mut table = Self::new(headers);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Reads a CSV file with a header row.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let file = fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Reads CSV data with a header row from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(TableError::MissingHeader);
        }
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(ToOwned::to_owned).collect());
        }
        Self::from_rows(headers, rows)
    }

    /// Writes the table (header first), creating parent directories.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Appends a row whose width must match the header.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), TableError> {
        if row.len() != self.headers.len() {
            return Err(TableError::RaggedRow {
                row: self.rows.len(),
                got: row.len(),
                expected: self.headers.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// Column cells with missing values as `None`.
    pub fn text_column(&self, name: &str) -> Result<Vec<Option<&str>>, TableError> {
        let idx = self.column_index(name)?;
        Ok(self
            .rows
            .iter()
            .map(|row| {
                let cell = row[idx].as_str();
                if is_missing(cell) {
                    None
                } else {
                    Some(cell)
                }
            })
            .collect())
    }

    /// Column parsed as floats, with missing values as `None`.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>, TableError> {
        let cells = self.text_column(name)?;
        cells
            .into_iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| TableError::NotNumeric {
                        column: name.to_string(),
                        row,
                        value: value.to_string(),
                    }),
            })
            .collect()
    }

    /// New table holding the rows at `indices`, in that order.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            headers: self.headers.clone(),
            rows: indices.iter().map(|&idx| self.rows[idx].clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "gender,math_score,reading_score\nfemale,72,72\nmale,,90\n";

    #[test]
    fn reads_headers_and_missing_cells() {
        let table = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.headers(), ["gender", "math_score", "reading_score"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.numeric_column("math_score").unwrap(),
            vec![Some(72.0), None]
        );
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Table::from_reader("a,b\n1,2\n3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::Csv(_)));
        let err = Table::from_rows(vec!["a".into()], vec![vec!["1".into(), "2".into()]])
            .unwrap_err();
        assert!(matches!(err, TableError::RaggedRow { expected: 1, got: 2, .. }));
    }

    #[test]
    fn reports_non_numeric_cells() {
        let table = Table::from_reader("score\nninety\n".as_bytes()).unwrap();
        let err = table.numeric_column("score").unwrap_err();
        assert!(err.to_string().contains("ninety"));
        assert!(matches!(
            table.numeric_column("absent"),
            Err(TableError::MissingColumn(_))
        ));
    }

    #[test]
    fn round_trips_through_csv_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let table = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        table.write_csv(&path).unwrap();
        assert_eq!(Table::read_csv(&path).unwrap(), table);
        assert_eq!(table.take(&[1]).rows()[0][0], "male");
    }

    #[test]
    fn missing_markers() {
        for cell in ["", "  ", "NA", "nan", "NULL"] {
            assert!(is_missing(cell), "{cell:?} should be missing");
        }
        assert!(!is_missing("none completed"));
    }
}
