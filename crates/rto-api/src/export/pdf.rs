//! Minimal PDF rendering of report tables.
//!
//! Produces a PDF 1.4 document in A4 landscape using the built-in Courier
//! font. Columns are sized from their content and truncated to fit the page
//! width; rows flow onto new pages with the header repeated.

use chrono::{DateTime, Utc};

use super::ReportTable;

const PAGE_WIDTH: f32 = 842.0;
const PAGE_HEIGHT: f32 = 595.0;
const MARGIN: f32 = 36.0;
const FONT_SIZE: f32 = 8.0;
const LINE_HEIGHT: f32 = 11.0;
/// Courier advance width is 600/1000 em.
const CHAR_WIDTH: f32 = FONT_SIZE * 0.6;
const COLUMN_GAP: usize = 2;
const MIN_COLUMN_WIDTH: usize = 4;

fn line_capacity() -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN) / CHAR_WIDTH) as usize
}

fn lines_per_page() -> usize {
    ((PAGE_HEIGHT - 2.0 * MARGIN) / LINE_HEIGHT) as usize
}

/// Column widths in characters, shrunk proportionally when the natural
/// widths exceed the page.
fn column_widths(table: &ReportTable) -> Vec<usize> {
    let mut widths: Vec<usize> = table
        .columns
        .iter()
        .map(|c| c.chars().count())
        .collect();
    for row in &table.rows {
        for (i, value) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(value.chars().count());
        }
    }

    let gaps = COLUMN_GAP * widths.len().saturating_sub(1);
    let available = line_capacity().saturating_sub(gaps);
    let natural: usize = widths.iter().sum();
    if natural > available && natural > 0 {
        for width in widths.iter_mut() {
            let scaled = *width * available / natural;
            *width = scaled.max(MIN_COLUMN_WIDTH).min(*width);
        }
    }
    widths
}

fn fit(value: &str, width: usize) -> String {
    let count = value.chars().count();
    if count <= width {
        return format!("{:<width$}", value, width = width);
    }
    if width <= 1 {
        return value.chars().take(width).collect();
    }
    let mut out: String = value.chars().take(width - 1).collect();
    out.push('~');
    out
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let gap = " ".repeat(COLUMN_GAP);
    widths
        .iter()
        .enumerate()
        .map(|(i, width)| fit(values.get(i).map(String::as_str).unwrap_or(""), *width))
        .collect::<Vec<_>>()
        .join(&gap)
        .trim_end()
        .to_string()
}

/// Escapes a line for a PDF literal string. Non-ASCII becomes `?`.
fn escape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Splits the table into pages of text lines.
fn paginate(table: &ReportTable, generated_at: DateTime<Utc>) -> Vec<Vec<String>> {
    let widths = column_widths(table);
    let header: Vec<String> = table.columns.iter().map(|c| c.to_string()).collect();
    let header_line = format_row(&header, &widths);
    let rule = "-".repeat(header_line.len().max(1));
    let generated = format!(
        "Generated {}  ({} rows)",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        table.rows.len()
    );

    // Title, generated line, blank, header, rule, and a footer line.
    let fixed = 6;
    let per_page = lines_per_page().saturating_sub(fixed).max(1);
    let chunks: Vec<&[Vec<String>]> = if table.rows.is_empty() {
        vec![&[]]
    } else {
        table.rows.chunks(per_page).collect()
    };
    let total = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, rows)| {
            let mut lines = vec![
                table.title.clone(),
                generated.clone(),
                String::new(),
                header_line.clone(),
                rule.clone(),
            ];
            lines.extend(rows.iter().map(|row| format_row(row, &widths)));
            lines.push(format!("Page {} of {}", index + 1, total));
            lines
        })
        .collect()
}

fn content_stream(lines: &[String]) -> String {
    let mut stream = format!(
        "BT\n/F1 {} Tf\n{} TL\n{} {} Td\n",
        FONT_SIZE,
        LINE_HEIGHT,
        MARGIN,
        PAGE_HEIGHT - MARGIN - FONT_SIZE
    );
    for line in lines {
        stream.push_str(&format!("({}) Tj T*\n", escape(line)));
    }
    stream.push_str("ET\n");
    stream
}

/// Renders the table as a complete PDF file.
pub fn to_pdf(table: &ReportTable, generated_at: DateTime<Utc>) -> Vec<u8> {
    let pages = paginate(table, generated_at);

    // 1 catalog, 2 page tree, 3 font, then a page and content object per page.
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + i * 2).collect();
    let mut objects: Vec<String> = Vec::with_capacity(3 + pages.len() * 2);
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" "),
        pages.len()
    ));
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Courier /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );
    for (lines, page_id) in pages.iter().zip(&page_ids) {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH,
            PAGE_HEIGHT,
            page_id + 1
        ));
        let stream = content_stream(lines);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            stream.len(),
            stream
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_offset = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{:010} 00000 n \n", offset));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));

    out.into_bytes()
}
