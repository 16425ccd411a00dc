//! Tabular input files: region reference data and target keyword lists.

use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};

use crate::{Error, Result};

/// Opens a CSV file, or a TSV file when the extension says so, with a header row.
pub(crate) fn table_reader(path: &Path) -> Result<Reader<std::fs::File>> {
    let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    };
    ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::data_load(path, e))
}

/// Position of a named column in the header row.
pub(crate) fn column_index(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        .ok_or_else(|| Error::data_load(path, format!("missing column {name:?}")))
}

/// Reads the raw business names from `column`, in file order. Blank cells are skipped.
pub fn load_targets(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = table_reader(path)?;
    let headers = reader.headers().map_err(|e| Error::data_load(path, e))?.clone();
    let idx = column_index(&headers, column, path)?;

    let mut targets = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| Error::data_load(path, e))?;
        if let Some(name) = row.get(idx).map(str::trim).filter(|s| !s.is_empty()) {
            targets.push(name.to_string());
        }
    }
    Ok(targets)
}
