//! Historical process data interface.
//!
//! Reads plant historian exports from CSV and answers point-in-time
//! queries. The file must carry a `timestamp` column
//! (`YYYY-MM-DD HH:MM:SS`); every other column is parsed as a numeric
//! field where possible and skipped otherwise (status/text columns such as
//! an operational-mode flag are not numeric process data).
//!
//! Lookups are *as-of*: the latest record at or before the queried
//! timestamp, `None` before the first record: the usual semantics for
//! sampling a historian.

use std::path::Path;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use tracing::info;

/// Timestamp format expected in the CSV.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised while loading historical data.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to read data file: {0}")]
    Csv(#[from] csv::Error),
    #[error("data file has no '{0}' column")]
    MissingColumn(String),
    #[error("unparseable timestamp '{value}' in row {row}")]
    BadTimestamp { value: String, row: usize },
}

/// One historian row: a timestamp plus its numeric fields.
#[derive(Debug, Clone)]
pub struct HistoricalRecord {
    pub timestamp: NaiveDateTime,
    fields: IndexMap<String, f64>,
}

impl HistoricalRecord {
    /// A numeric field by column name.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    /// Field names in file order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// CSV-backed historical data reader.
#[derive(Debug, Clone)]
pub struct CsvDataReader {
    records: Vec<HistoricalRecord>,
}

impl CsvDataReader {
    /// Loads a CSV file, sorting records by timestamp.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;

        let headers = reader.headers()?.clone();
        let timestamp_column = headers
            .iter()
            .position(|h| h == "timestamp")
            .ok_or_else(|| DataError::MissingColumn("timestamp".to_string()))?;

        let mut records = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let record = result?;
            let raw_timestamp = record.get(timestamp_column).unwrap_or_default();
            let timestamp = NaiveDateTime::parse_from_str(raw_timestamp, TIMESTAMP_FORMAT)
                .map_err(|_| DataError::BadTimestamp {
                    value: raw_timestamp.to_string(),
                    row: row + 1,
                })?;

            let mut fields = IndexMap::new();
            for (column, value) in headers.iter().zip(record.iter()) {
                if column == "timestamp" {
                    continue;
                }
                if let Ok(number) = value.parse::<f64>() {
                    fields.insert(column.to_string(), number);
                }
            }
            records.push(HistoricalRecord { timestamp, fields });
        }

        records.sort_by_key(|r| r.timestamp);
        info!(
            "loaded {} historical records from {}",
            records.len(),
            path.as_ref().display()
        );
        Ok(CsvDataReader { records })
    }

    /// The latest record at or before `timestamp`; `None` if the query
    /// precedes every record.
    pub fn get_data_at_timestamp(&self, timestamp: NaiveDateTime) -> Option<&HistoricalRecord> {
        let after = self.records.partition_point(|r| r.timestamp <= timestamp);
        after.checked_sub(1).map(|i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in time order.
    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_fixture(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("seqmod_{}_{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    const FIXTURE: &str = "\
timestamp,feed_flow_rate,reactor_temp,operational_mode
2023-01-10 10:00:00,360.0,80.0,Normal
2023-01-10 11:00:00,400.0,82.0,Normal
2023-01-10 12:00:00,420.0,85.0,Transient
";

    #[test]
    fn test_load_and_asof_lookup() {
        let path = write_fixture("asof.csv", FIXTURE);
        let reader = CsvDataReader::from_path(&path).unwrap();
        assert_eq!(reader.len(), 3);

        // Exact hit.
        let record = reader.get_data_at_timestamp(ts("2023-01-10 11:00:00")).unwrap();
        assert_eq!(record.get("feed_flow_rate"), Some(400.0));

        // Between rows: the earlier one.
        let record = reader.get_data_at_timestamp(ts("2023-01-10 11:30:00")).unwrap();
        assert_eq!(record.get("reactor_temp"), Some(82.0));

        // After the last row: the last one.
        let record = reader.get_data_at_timestamp(ts("2023-06-01 00:00:00")).unwrap();
        assert_eq!(record.get("feed_flow_rate"), Some(420.0));

        // Before the first row: nothing.
        assert!(reader.get_data_at_timestamp(ts("2022-01-01 00:00:00")).is_none());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_non_numeric_columns_are_skipped() {
        let path = write_fixture("text.csv", FIXTURE);
        let reader = CsvDataReader::from_path(&path).unwrap();
        let record = reader.get_data_at_timestamp(ts("2023-01-10 12:00:00")).unwrap();

        assert!(record.get("operational_mode").is_none());
        assert_eq!(record.fields().count(), 2);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_timestamp_column_is_an_error() {
        let path = write_fixture("nots.csv", "time,value\n2023-01-01 00:00:00,1.0\n");
        let err = CsvDataReader::from_path(&path).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(column) if column == "timestamp"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_bad_timestamp_is_an_error() {
        let path = write_fixture("badts.csv", "timestamp,value\nnot-a-time,1.0\n");
        let err = CsvDataReader::from_path(&path).unwrap_err();
        assert!(matches!(err, DataError::BadTimestamp { row: 1, .. }));
        std::fs::remove_file(path).ok();
    }
}
