//! PDF handler: full text for the prompt, first pages for upload.

use super::{read_file, truncate_text, Adapted, WorkingCopy};
use crate::error::ExtractError;
use lopdf::Document;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Pages kept in the uploaded copy
const UPLOAD_PAGES: u32 = 2;

pub(super) fn adapt(path: &Path) -> Result<Adapted, ExtractError> {
    let bytes = read_file(path)?;
    tracing::debug!("[Content] PDF file size: {} bytes", bytes.len());

    let text = match extract_text(&bytes) {
        Ok(text) => Some(truncate_text(&text)),
        Err(e) => {
            // A scanned or oddly encoded PDF can still be classified from its pages
            tracing::warn!(
                "[Content] PDF text extraction failed for {}: {}",
                path.display(),
                e
            );
            None
        }
    };

    let first_pages = first_pages(&bytes)?;

    Ok(Adapted {
        text,
        working_copy: Some(WorkingCopy::from_bytes(&first_pages, ".pdf")?),
    })
}

/// The pdf_extract crate (and its cff-parser dependency) can panic on certain fonts/glyphs
fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_panic) => Err(ExtractError::Panicked),
    }
}

/// Re-serialize the document with only the first UPLOAD_PAGES pages
fn first_pages(bytes: &[u8]) -> Result<Vec<u8>, ExtractError> {
    let trimmed = catch_unwind(AssertUnwindSafe(|| -> Result<Vec<u8>, ExtractError> {
        let mut doc = Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

        let extra: Vec<u32> = doc
            .get_pages()
            .keys()
            .copied()
            .filter(|&n| n > UPLOAD_PAGES)
            .collect();
        if extra.is_empty() {
            return Ok(bytes.to_vec());
        }

        doc.delete_pages(&extra);
        doc.prune_objects();

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        Ok(out)
    }));

    trimmed.unwrap_or(Err(ExtractError::Panicked))
}

#[cfg(test)]
pub(crate) fn sample_pdf(pages: usize) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Invoice page {}", i + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
