use std::path::Path;

use csv::ReaderBuilder;
use nalgebra::DMatrix;

use ht_types::{DataError, Dataset, HtResult};

/// A numeric table read from disk: column names plus an `n × d` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub names: Vec<String>,
    pub values: DMatrix<f64>,
}

impl Table {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }
}

/// Loader for delimited numeric tables
#[derive(Debug, Clone)]
pub struct CsvLoader {
    has_headers: bool,
    delimiter: u8,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvLoader {
    pub fn new() -> Self {
        Self {
            has_headers: true,
            delimiter: b',',
        }
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load every well-formed row of a CSV file.
    ///
    /// Rows whose field count differs from the header are skipped with a
    /// warning; a cell that is not a number fails the whole load.
    pub fn load_table<P: AsRef<Path>>(&self, file_path: P) -> HtResult<Table> {
        let path = file_path.as_ref();
        tracing::info!("Loading CSV table from: {}", path.display());

        let mut rdr = ReaderBuilder::new()
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to open CSV file {}: {}", path.display(), e),
            })?;

        let mut names: Option<Vec<String>> = if self.has_headers {
            let headers = rdr.headers().map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV headers: {}", e),
            })?;
            tracing::debug!("CSV headers: {:?}", headers);
            Some(headers.iter().map(|h| h.trim().to_string()).collect())
        } else {
            None
        };

        let first_line = if self.has_headers { 2 } else { 1 };
        let mut cells: Vec<f64> = Vec::new();
        let mut n_rows = 0;

        for (line_num, result) in rdr.records().enumerate() {
            let line = line_num + first_line;
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", line, e),
            })?;

            let width = names
                .get_or_insert_with(|| (0..record.len()).map(|i| format!("column_{i}")).collect())
                .len();
            if record.len() != width {
                tracing::warn!(
                    "Skipping record at line {}: expected {} fields, found {}",
                    line,
                    width,
                    record.len()
                );
                continue;
            }

            for (column, field) in record.iter().enumerate() {
                let value = field.trim().parse::<f64>().map_err(|_| DataError::ParseError {
                    message: format!(
                        "Invalid number '{}' at line {}, column {}",
                        field,
                        line,
                        column + 1
                    ),
                })?;
                cells.push(value);
            }
            n_rows += 1;
        }

        let names = names.unwrap_or_default();
        if n_rows == 0 {
            return Err(DataError::InsufficientData {
                message: format!("{} contains no usable rows", path.display()),
            }
            .into());
        }

        tracing::info!("Loaded {} rows x {} columns", n_rows, names.len());
        Ok(Table {
            values: DMatrix::from_row_slice(n_rows, names.len(), &cells),
            names,
        })
    }
}

/// Load features and targets from two CSV files with header rows.
pub fn load_dataset<P: AsRef<Path>, Q: AsRef<Path>>(features: P, targets: Q) -> HtResult<Dataset> {
    let loader = CsvLoader::new();
    let x = loader.load_table(features)?;
    let y = loader.load_table(targets)?;
    Dataset::with_names(x.values, y.values, x.names, y.names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_csv_loading() {
        let file = csv_file("a,b\n1,2\n3.5,4\n");
        let table = CsvLoader::new().load_table(file.path()).unwrap();
        assert_eq!(table.names, vec!["a", "b"]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.values[(1, 0)], 3.5);
        assert_eq!(table.values[(0, 1)], 2.0);
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let file = csv_file("a,b\n1,2\n3\n5,6\n");
        let table = CsvLoader::new().load_table(file.path()).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.values[(1, 0)], 5.0);
    }

    #[test]
    fn test_bad_cell_fails() {
        let file = csv_file("a,b\n1,two\n");
        let err = CsvLoader::new().load_table(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_headerless_tables_get_generated_names() {
        let file = csv_file("1;2\n3;4\n");
        let table = CsvLoader::new()
            .with_headers(false)
            .with_delimiter(b';')
            .load_table(file.path())
            .unwrap();
        assert_eq!(table.names, vec!["column_0", "column_1"]);
        assert_eq!(table.n_rows(), 2);
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let file = csv_file("a,b\n");
        assert!(CsvLoader::new().load_table(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(CsvLoader::new().load_table("/nonexistent/x.csv").is_err());
    }

    #[test]
    fn test_dataset_from_two_files() {
        let x = csv_file("f1,f2\n0,1\n1,0\n2,2\n");
        let y = csv_file("target\n0\n1\n1\n");
        let dataset = load_dataset(x.path(), y.path()).unwrap();
        assert_eq!(dataset.n_samples(), 3);
        assert_eq!(dataset.n_features(), 2);
        assert_eq!(dataset.target_names, vec!["target"]);

        let short = csv_file("target\n0\n");
        assert!(load_dataset(x.path(), short.path()).is_err());
    }
}
