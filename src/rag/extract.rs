//! Text and table extraction from uploaded files

use crate::types::{AppError, FileKind, Result};

/// Parsed CSV contents. Every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// A row rendered as one `column: value` line per cell.
    pub fn render_row(&self, index: usize) -> Option<String> {
        self.rows.get(index).map(|row| {
            self.headers
                .iter()
                .zip(row)
                .map(|(h, v)| format!("{}: {}", h, v))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Indices of the first two and last two rows, without repeats.
    pub fn sample_indices(&self) -> Vec<usize> {
        let n = self.rows.len();
        let mut indices: Vec<usize> = (0..n.min(2)).collect();
        if n > 2 {
            for i in n.saturating_sub(2)..n {
                if !indices.contains(&i) {
                    indices.push(i);
                }
            }
        }
        indices
    }
}

/// Plain text of a text or PDF upload.
pub fn extract_text(kind: FileKind, bytes: &[u8]) -> Result<String> {
    match kind {
        FileKind::Text => Ok(String::from_utf8_lossy(strip_bom(bytes)).into_owned()),
        FileKind::Pdf => extract_pdf(bytes),
        FileKind::Csv => Err(AppError::InvalidInput(
            "CSV files are ingested as tables, not text".to_string(),
        )),
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| AppError::InvalidInput(format!("Unreadable PDF: {}", e)))?;

    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    pages.push(text.to_string());
                }
            }
            Err(e) => tracing::warn!(page = page_number, error = %e, "skipping unreadable PDF page"),
        }
    }

    if pages.is_empty() {
        return Err(AppError::InvalidInput(
            "PDF contains no extractable text".to_string(),
        ));
    }

    Ok(pages.join("\n"))
}

/// Parse a CSV upload. The delimiter is `;` when the header line has more
/// semicolons than commas, else `,`.
pub fn parse_csv(bytes: &[u8]) -> Result<CsvTable> {
    let bytes = strip_bom(bytes);
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    let delimiter = if semicolons > commas { b';' } else { b',' };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::InvalidInput(format!("Invalid CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(AppError::InvalidInput("CSV file has no header".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| AppError::InvalidInput(format!("Invalid CSV row: {}", e)))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    Ok(CsvTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_extraction_is_lossy_utf8() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("Cardápio".as_bytes());
        bytes.push(0xFF);
        let text = extract_text(FileKind::Text, &bytes).expect("text");
        assert!(text.starts_with("Cardápio"));
        assert!(text.ends_with('\u{FFFD}'));
    }

    #[test]
    fn test_invalid_pdf_is_bad_input() {
        let result = extract_text(FileKind::Pdf, b"not a pdf");
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_csv_semicolon_and_padding() {
        let table = parse_csv(b"data;valor;cliente\n2024-01-02;10,50;ana\n2024-01-03;7\n\n")
            .expect("csv");
        assert_eq!(table.headers, vec!["data", "valor", "cliente"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["2024-01-02", "10,50", "ana"],
                vec!["2024-01-03", "7", ""],
            ]
        );
    }

    #[test]
    fn test_render_row_and_samples() {
        let table = parse_csv(b"a,b\n1,2\n3,4\n5,6\n7,8\n9,10\n").expect("csv");
        assert_eq!(table.render_row(0).as_deref(), Some("a: 1\nb: 2"));
        assert_eq!(table.sample_indices(), vec![0, 1, 3, 4]);

        let small = parse_csv(b"a\n1\n2\n3\n").expect("csv");
        assert_eq!(small.sample_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_csv_rejected() {
        assert!(parse_csv(b"").is_err());
    }
}
