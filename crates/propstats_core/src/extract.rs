use std::sync::OnceLock;

use regex::Regex;

static RE_DATATYPE: OnceLock<Regex> = OnceLock::new();

fn datatype_pattern() -> &'static Regex {
    RE_DATATYPE.get_or_init(|| {
        // `.` stops at newlines, so each match stays within one template line.
        Regex::new(r"\|.*datatype.*=(.*?)[|\n]").expect("valid datatype regex")
    })
}

/// Raw `datatype` values declared on a proposal page, in document order.
pub fn extract_type_declarations(page_text: &str) -> Vec<String> {
    datatype_pattern()
        .captures_iter(page_text)
        .filter_map(|captures| captures.get(1))
        .map(|value| value.as_str().to_string())
        .collect()
}
