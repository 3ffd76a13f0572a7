//! Prompt text for the extraction and judge models

use crate::types::FieldName;

/// System prompt for profile extraction
pub const EXTRACTION_SYSTEM: &str = "You are an expert assistant tasked with extracting faculty \
profile information from web page text. Extract the requested information accurately based only \
on the provided text. Do not guess or invent information that is not present; use null for \
anything the text does not state.

Respond with a single JSON object with these keys:
- photo_url: URL of the faculty member's photo
- first_name, middle_name, last_name: the person's name (middle_name may be an initial)
- title: official title or position
- office: office location (building, room number)
- phone: contact phone number
- email: contact email address
- college_unit: the college or primary administrative unit
- department_division: the department or division within the college or unit
- degrees: list of objects {\"degree_type\", \"institution\", \"year\"} for each academic degree
- research_focus_areas: list of research focus areas or interests

All values are strings, lists or null.";

/// User prompt for profile extraction
pub fn extraction_user(page_text: &str) -> String {
    format!(
        "Please extract the faculty profile details from the following text content:\n\n---\n{}\n---",
        page_text
    )
}

/// System prompt for the judge
pub fn judge_system() -> String {
    let keys = FieldName::ALL
        .iter()
        .map(|f| format!("{}_status", f))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an impartial evaluator assessing the accuracy of extracted information based \
only on the provided source text. Compare every field of the Extracted Data JSON object against \
the Source Text and assign one status per field:
- \"Correct\": the extracted value is present and accurate in the Source Text.
- \"Incorrect\": the extracted value is inaccurate or was not found in the Source Text.
- \"Missing\": the information exists in the Source Text but was not extracted.
- \"Not Applicable\": the field cannot be judged for this page.

Respond with a single JSON object with the keys {keys}. You may add a \"<field>_reason\" string \
next to any status, and an optional \"overall_comment\" string."
    )
}

/// User prompt for the judge
pub fn judge_user(page_text: &str, extracted_json: &str) -> String {
    format!(
        "Source Text:\n---\n{}\n---\n\nExtracted Data:\n---\n{}\n---\n\nPlease evaluate the \
Extracted Data based on the Source Text and respond in the required format.",
        page_text, extracted_json
    )
}
