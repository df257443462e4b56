//! Raw CSV tables
//!
//! Vendor exports put metadata rows above the real header and are not always
//! rectangular, so tables are read without assuming the header is on the first
//! line. Records that fail to parse below the header are counted and skipped.

use crate::error::IngestError;
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;

/// A parsed export table
#[derive(Debug, Clone)]
pub struct CsvTable {
    header_map: HashMap<String, usize>,
    headers: Vec<String>,
    rows: Vec<Row>,
    /// Records below the header that the CSV reader rejected
    pub unreadable_rows: usize,
}

/// One data row with its source line number
#[derive(Debug, Clone)]
pub struct Row {
    pub line: usize,
    record: StringRecord,
}

impl Row {
    /// Cell at `index`, empty when the row is short
    pub fn get(&self, index: usize) -> &str {
        self.record.get(index).unwrap_or("")
    }

    fn is_blank(&self) -> bool {
        self.record.iter().all(|cell| cell.trim().is_empty())
    }
}

impl CsvTable {
    /// Parse `text`, taking the record at `header_row` (zero based) as header
    pub fn parse(text: &str, delimiter: u8, header_row: usize) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let mut headers: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut unreadable_rows = 0usize;

        for (idx, result) in reader.records().enumerate() {
            if idx < header_row {
                // Metadata rows only need to be skippable
                continue;
            }
            if headers.is_none() {
                let record = result?;
                headers = Some(record.iter().map(normalize_header_name).collect());
                continue;
            }
            match result {
                Ok(record) => {
                    let line = record
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(idx + 1);
                    let row = Row { line, record };
                    if !row.is_blank() {
                        rows.push(row);
                    }
                }
                Err(_) => unreadable_rows += 1,
            }
        }

        let headers = headers.ok_or_else(|| {
            IngestError::MalformedHeader(format!("no header found at row {}", header_row + 1))
        })?;

        let header_map = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        Ok(Self {
            header_map,
            headers,
            rows,
            unreadable_rows,
        })
    }

    /// Index of a required column
    pub fn column(&self, name: &str) -> Result<usize, IngestError> {
        self.header_map
            .get(normalize_header_name(name).as_str())
            .copied()
            .ok_or_else(|| IngestError::MissingColumn(name.to_string()))
    }

    /// Index of an optional column
    pub fn optional_column(&self, name: &str) -> Option<usize> {
        self.column(name).ok()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet tools sometimes prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

/// Read an export file as text, replacing invalid UTF-8
pub fn read_export(path: &Path) -> Result<String, IngestError> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_below_metadata_row() {
        let text = "Periodo: 01/01/2024 - 07/01/2024\n\
                    Marca de tiempo,Tasa\n\
                    01/01/2024 08:00,\"0,85\"\n";
        let table = CsvTable::parse(text, b',', 1).unwrap();

        assert_eq!(table.headers(), &["Marca de tiempo", "Tasa"]);
        assert_eq!(table.len(), 1);
        let rate = table.column("Tasa").unwrap();
        assert_eq!(table.rows()[0].get(rate), "0,85");
        assert_eq!(table.rows()[0].line, 3);
    }

    #[test]
    fn test_missing_column() {
        let table = CsvTable::parse("a;b\n1;2\n", b';', 0).unwrap();
        assert!(matches!(table.column("c"), Err(IngestError::MissingColumn(_))));
        assert_eq!(table.optional_column("b"), Some(1));
    }

    #[test]
    fn test_bom_and_whitespace_in_headers() {
        let table = CsvTable::parse("\u{feff}time , value\n1,2\n", b',', 0).unwrap();
        assert!(table.column("time").is_ok());
        assert!(table.column(" value").is_ok());
    }

    #[test]
    fn test_short_rows_read_as_empty() {
        let table = CsvTable::parse("a,b,c\n1\n\n", b',', 0).unwrap();
        assert_eq!(table.rows()[0].get(2), "");
        assert!(!table.rows()[0].is_blank());
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let table = CsvTable::parse("a,b\n1,2\n , \n,\n3,4\n", b',', 0).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].get(0), "3");
        assert_eq!(table.rows()[1].line, 5);
        assert_eq!(table.unreadable_rows, 0);
    }

    #[test]
    fn test_empty_input_has_no_header() {
        assert!(matches!(
            CsvTable::parse("", b',', 0),
            Err(IngestError::MalformedHeader(_))
        ));
        assert!(CsvTable::parse("only one line\n", b',', 1).is_err());
    }
}
