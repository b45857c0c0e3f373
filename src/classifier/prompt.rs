//! Classification prompt template.

use crate::categories::{CategorySet, MISC};

const TEMPLATE: &str = r#"Document Naming Assistant Task

Purpose: Analyze a document and create a standardized, descriptive filename that makes it easy to identify the content.

Input:
- Original filename: {relative_file_path}. If the file name already contains useful information, you can use it in the new filename.
- Document content (may be OCRed text with potential errors)

Process:

    List these key elements (brief, no explanations):

    type: Document type. Some examples: invoice, bill, fine, ticket, leaflet, prescription, report, letter, email, contract, agreement, specification, manual, guide, form, certificate, statement, receipt, boarding pass, painting, photo, note.
    date: Document date (could be year, year-month, or full date). Use YYYY-MM-DD format. Can be an empty string.
    topic: The main subject of the document. This will be part of the file name. Be specific and descriptive.
    owner: The main person or entity involved in the document. For a private person use the first name only.
    folder: The folder where the document should be stored. Choose from the folders defined below. If none of the folders is a good match return {misc}.
    keywords: list of keywords that describe the document content.

    Use kebab-case in all your responses (lowercase with hyphens), avoid special characters and spaces, limit to ascii letters, digits and hyphen.

    Files should be organized into the following categories based on content.

{folders_list}
"#;

/// Render the prompt for one file.
///
/// `relative_path` is the file's path relative to the input root.
pub fn build_prompt(relative_path: &str, categories: &CategorySet) -> String {
    TEMPLATE
        .replace("{relative_file_path}", relative_path)
        .replace("{misc}", MISC)
        .replace("{folders_list}", &categories.prompt_listing())
}
