use super::{truncate_text, Adapted};
use crate::error::ExtractError;
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;

/// Excel workbooks: the first sheet rendered as ` | `-separated rows
pub(super) fn adapt(path: &Path) -> Result<Adapted, ExtractError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ExtractError::EmptyWorkbook)?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;

    let text = render_rows(&range);
    tracing::debug!(
        "[Content] Sheet '{}' extracted: {} chars from {}",
        first,
        text.len(),
        path.display()
    );

    Ok(Adapted {
        text: Some(truncate_text(&text)),
        working_copy: None,
    })
}

fn render_rows(range: &Range<Data>) -> String {
    let mut all_text = String::new();
    for row in range.rows() {
        let row_text: Vec<String> = row
            .iter()
            .map(|cell| cell.to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if !row_text.is_empty() {
            all_text.push_str(&row_text.join(" | "));
            all_text.push('\n');
        }
    }
    all_text
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rows_render_with_separators() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 1));
        range.set_value((0, 0), Data::String("Item".into()));
        range.set_value((0, 1), Data::String("Amount".into()));
        range.set_value((2, 0), Data::String("Fuel".into()));
        range.set_value((2, 1), Data::Int(40));

        assert_eq!(render_rows(&range), "Item | Amount\nFuel | 40\n");
    }

    #[test]
    fn test_garbage_workbook_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("budget.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(adapt(&path), Err(ExtractError::Spreadsheet(_))));
    }
}
