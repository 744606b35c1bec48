//! CSV rendering.

use super::ReportTable;
use crate::error::ApiError;

/// Writes the header row and every data row.
pub fn to_csv(table: &ReportTable) -> Result<Vec<u8>, ApiError> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());

    writer
        .write_record(&table.columns)
        .map_err(|e| ApiError::Internal(format!("Failed to write CSV header: {}", e)))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| ApiError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("Failed to flush CSV: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotes_fields_with_commas() {
        let mut table = ReportTable::new("Policies", vec!["number", "title"]);
        table.push(vec!["POL-1".into(), "Privacy, data and records".into()]);
        table.push(vec!["POL-2".into(), "Says \"hello\"".into()]);

        let out = String::from_utf8(to_csv(&table).unwrap()).unwrap();
        assert_eq!(
            out,
            "number,title\nPOL-1,\"Privacy, data and records\"\nPOL-2,\"Says \"\"hello\"\"\"\n"
        );
    }

    #[test]
    fn test_header_only() {
        let table = ReportTable::new("Empty", vec!["a", "b"]);
        assert_eq!(to_csv(&table).unwrap(), b"a,b\n");
    }
}
