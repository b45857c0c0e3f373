use super::{read_file, truncate_text, Adapted};
use crate::error::ExtractError;
use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use std::path::Path;

/// Word documents: paragraph text, one paragraph per line
pub(super) fn adapt(path: &Path) -> Result<Adapted, ExtractError> {
    let bytes = read_file(path)?;
    let doc = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut all_text = String::new();
    for child in &doc.document.children {
        extract_docx_content(child, &mut all_text);
    }

    tracing::debug!(
        "[Content] DOCX extracted: {} chars from {}",
        all_text.len(),
        path.display()
    );

    Ok(Adapted {
        text: Some(truncate_text(all_text.trim())),
        working_copy: None,
    })
}

/// Extract text from DOCX document elements (paragraphs and tables)
fn extract_docx_content(element: &DocumentChild, output: &mut String) {
    match element {
        DocumentChild::Paragraph(para) => {
            push_paragraph(&para.children, output);
            output.push('\n');
        }
        DocumentChild::Table(table) => {
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(row) = row;
                for cell in &row.cells {
                    let docx_rs::TableRowChild::TableCell(cell) = cell;
                    for content in &cell.children {
                        if let docx_rs::TableCellContent::Paragraph(para) = content {
                            push_paragraph(&para.children, output);
                            output.push(' ');
                        }
                    }
                }
                output.push('\n');
            }
        }
        _ => {}
    }
}

fn push_paragraph(children: &[ParagraphChild], output: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => push_run(&run.children, output),
            ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let ParagraphChild::Run(run) = inner {
                        push_run(&run.children, output);
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_run(children: &[RunChild], output: &mut String) {
    for child in children {
        match child {
            RunChild::Text(text) => output.push_str(&text.text),
            RunChild::Tab(_) => output.push('\t'),
            _ => {}
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_docx(paragraphs: &[&str]) -> Vec<u8> {
    use docx_rs::{Docx, Paragraph, Run};

    let mut docx = Docx::new();
    for text in paragraphs {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
    }
    let mut cursor = std::io::Cursor::new(Vec::new());
    docx.build().pack(&mut cursor).unwrap();
    cursor.into_inner()
}
