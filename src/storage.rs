use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::dataset::{Dataset, MalformedRecord, ParseReport};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse JSON dataset: {0}")]
    JsonDecode(serde_json::Error),
    #[error("failed to encode JSON dataset: {0}")]
    JsonEncode(serde_json::Error),
    #[error("dataset must be a JSON array of records")]
    NotAnArray,
}

/// Loads a JSON array, or JSON Lines with one record per line.
pub fn load_dataset(path: &Path) -> Result<ParseReport, DatasetError> {
    let raw = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "dataset file not found; starting empty");
            return Ok(ParseReport::default());
        }
        Err(err) => return Err(DatasetError::Io(err)),
    };

    let report = parse_dataset(&raw)?;
    info!(
        path = %path.display(),
        days = report.dataset.days().len(),
        skipped = report.skipped.len(),
        "loaded dataset"
    );
    Ok(report)
}

pub fn parse_dataset(raw: &str) -> Result<ParseReport, DatasetError> {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        return Ok(ParseReport::default());
    }

    if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed).map_err(DatasetError::JsonDecode)?;
        let Value::Array(values) = value else {
            return Err(DatasetError::NotAnArray);
        };
        return Ok(Dataset::from_values(&values));
    }

    if !trimmed.starts_with('{') {
        return Err(DatasetError::NotAnArray);
    }

    let mut values = Vec::new();
    let mut unreadable = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => values.push(value),
            Err(err) => unreadable.push(MalformedRecord::InvalidField {
                location: format!("line {}", index + 1),
                field: "json",
                reason: err.to_string(),
            }),
        }
    }

    for record in &unreadable {
        warn!(%record, "skipping unreadable line");
    }

    let mut report = Dataset::from_values(&values);
    report.skipped.extend(unreadable);
    Ok(report)
}

pub fn save_dataset(path: &Path, dataset: &Dataset) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let encoded = serde_json::to_string_pretty(dataset.days()).map_err(DatasetError::JsonEncode)?;
    let mut file = fs::File::create(path)?;
    file.write_all(encoded.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use std::fs;
    use std::path::PathBuf;

    use crate::dataset::Dataset;
    use crate::domain::DetailRecord;

    use super::{DatasetError, load_dataset, parse_dataset, save_dataset};

    #[test]
    fn round_trips_day_records_through_json() {
        let at = |day: u32, hour: u32| {
            NaiveDate::from_ymd_opt(2016, 1, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap()
        };
        let dataset = Dataset::from_details(vec![
            DetailRecord::new(at(1, 9), "A", 3600),
            DetailRecord::new(at(1, 11), "B", 1800),
            DetailRecord::new(at(2, 10), "A", 60),
        ]);

        let path = temp_file("chronos_heatmap_roundtrip.json");
        save_dataset(&path, &dataset).expect("save should succeed");
        let loaded = load_dataset(&path).expect("load should succeed");
        assert!(loaded.skipped.is_empty());
        assert_eq!(loaded.dataset, dataset);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn reads_json_lines_and_skips_broken_lines() {
        let raw = concat!(
            "{\"date\": \"2016-01-01T09:00:00\", \"name\": \"A\", \"value\": 10}\n",
            "{\"date\": \"2016-01-01T10:00:00\", \"name\": \n",
            "\n",
            "{\"date\": \"2016-01-02T10:00:00\", \"name\": \"B\", \"value\": 20}\n",
        );
        let report = parse_dataset(raw).expect("parse should succeed");
        assert_eq!(report.dataset.days().len(), 2);
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let path = temp_file("chronos_heatmap_missing.json");
        let report = load_dataset(&path).expect("missing file should not fail");
        assert!(report.dataset.is_empty());
    }

    #[test]
    fn rejects_non_array_documents() {
        assert!(matches!(parse_dataset("[1, 2"), Err(DatasetError::JsonDecode(_))));
        assert!(matches!(parse_dataset("\"records\""), Err(DatasetError::NotAnArray)));
        assert!(parse_dataset("   ").expect("blank is empty").dataset.is_empty());
    }

    fn temp_file(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("{}_{}", name, std::process::id()));
        path
    }
}
