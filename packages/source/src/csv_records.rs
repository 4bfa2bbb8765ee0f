//! CSV body to JSON-object rows.
//!
//! Header names are trimmed and lowercased so alias lookup in
//! [`crate::normalize`] is case-insensitive. Cell values are kept as
//! strings; numeric parsing happens during normalization.

use crate::SourceError;

/// Parses a CSV document into one [`serde_json::Value::Object`] per row.
///
/// Rows with fewer fields than the header are padded with empty strings.
/// Rows where every field is empty are dropped.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the document is not valid CSV.
pub fn parse_csv_records(body: &str) -> Result<Vec<serde_json::Value>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let mut map = serde_json::Map::new();
        for (i, header) in headers.iter().enumerate() {
            let value = record.get(i).unwrap_or("").trim().to_owned();
            map.insert(header.clone(), serde_json::Value::String(value));
        }
        rows.push(serde_json::Value::Object(map));
    }

    log::debug!("Parsed {} CSV rows ({} columns)", rows.len(), headers.len());

    Ok(rows)
}
