//! Work items from a headerless, single-column CSV file.

use crate::crawl::WorkItem;
use crate::error::{CrawlError, Result};
use std::io::Read;
use std::path::Path;

/// Read work items, one per row, in file order.
///
/// Blank lines are skipped. A row with more than one field, or whose only
/// field is empty, is an [`CrawlError::Input`] naming the line.
pub fn read_work_items<R: Read>(reader: R) -> Result<Vec<WorkItem>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut items = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CrawlError::Input {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            reason: e.to_string(),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        if record.len() != 1 {
            return Err(CrawlError::Input {
                line,
                reason: format!("expected one field, found {}", record.len()),
            });
        }
        let target = &record[0];
        if target.is_empty() {
            return Err(CrawlError::Input {
                line,
                reason: "empty target".to_string(),
            });
        }
        items.push(WorkItem::new(items.len(), target));
    }
    Ok(items)
}

/// Open and read a work file.
pub fn read_work_file(path: &Path) -> Result<Vec<WorkItem>> {
    let file = std::fs::File::open(path).map_err(|e| {
        CrawlError::Configuration(format!("cannot open input {}: {e}", path.display()))
    })?;
    read_work_items(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_become_ordered_items() {
        let input = "Acme Corp\n\"Widgets, Inc.\"\n  Blocked Co  \n";
        let items = read_work_items(input.as_bytes()).unwrap();
        let targets: Vec<&str> = items.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["Acme Corp", "Widgets, Inc.", "Blocked Co"]);
        assert_eq!(items[2].index, 2);
    }

    #[test]
    fn test_multi_field_row_is_fatal_with_line() {
        let err = read_work_items("acme\nfoo,bar\n".as_bytes()).unwrap_err();
        match err {
            CrawlError::Input { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(read_work_items("acme\nfoo,bar\n".as_bytes())
            .unwrap_err()
            .is_fatal());
    }

    #[test]
    fn test_whitespace_only_row_is_fatal() {
        let err = read_work_items("acme\n   \n".as_bytes()).unwrap_err();
        assert!(matches!(err, CrawlError::Input { line: 2, .. }));
    }

    #[test]
    fn test_empty_input_has_no_items() {
        assert!(read_work_items("".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = read_work_file(Path::new("/nonexistent/targets.csv")).unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }
}
