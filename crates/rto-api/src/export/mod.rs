//! Report rendering as JSON, CSV or PDF downloads.

pub mod csv;
pub mod pdf;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ApiError;

/// Output format requested through `?format=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
    Pdf,
}

impl ReportFormat {
    /// Parses the query value; absent means JSON.
    pub fn parse(value: Option<&str>) -> Result<Self, ApiError> {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            Some("pdf") => Ok(Self::Pdf),
            Some(other) => Err(ApiError::validation_field(
                "format",
                format!("Unsupported format: {}. Use 'json', 'csv', or 'pdf'", other),
            )),
        }
    }
}

/// A report flattened to text cells for tabular output.
#[derive(Debug, Clone)]
pub struct ReportTable {
    pub title: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new(title: impl Into<String>, columns: Vec<&'static str>) -> Self {
        Self {
            title: title.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

/// Formats an optional value as a table cell.
pub fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Formats an optional timestamp as a date cell.
pub fn date_cell(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Builds a download response with `Content-Disposition: attachment`.
pub fn attachment(bytes: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Renders `data` as JSON, or `table` as a CSV or PDF attachment named
/// `{stem}-{date}.{ext}`.
pub fn render_report<T: Serialize>(
    format: ReportFormat,
    stem: &str,
    data: &T,
    table: impl FnOnce() -> ReportTable,
) -> Result<Response, ApiError> {
    let now = Utc::now();
    let filename = |ext: &str| format!("{}-{}.{}", stem, now.format("%Y%m%d"), ext);

    match format {
        ReportFormat::Json => Ok(Json(data).into_response()),
        ReportFormat::Csv => {
            let bytes = csv::to_csv(&table())?;
            Ok(attachment(bytes, "text/csv; charset=utf-8", &filename("csv")))
        }
        ReportFormat::Pdf => {
            let bytes = pdf::to_pdf(&table(), now);
            Ok(attachment(bytes, "application/pdf", &filename("pdf")))
        }
    }
}
