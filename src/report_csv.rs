//! Minimal parser for the comma-delimited report files.
//!
//! The report format is simple enough that we split on newlines and commas
//! directly. A single matching pair of surrounding quotes (double or single)
//! is stripped from each field; escaped quotes or delimiters inside quoted
//! fields are not supported, so commas inside quoted values shift column
//! alignment. That limitation matches the upstream report format as shipped.

/// Parses report text into rows of string fields.
///
/// Pure function of its input: re-parsing the same text yields the same rows.
/// A trailing newline produces a final row containing one empty field;
/// callers are expected to tolerate it.
pub fn parse(text: &str) -> Vec<Vec<String>> {
    text.split('\n')
        .map(|line| {
            line.split(',')
                .map(|field| strip_outer_quotes(field).to_string())
                .collect()
        })
        .collect()
}

/// Strips at most one matching pair of outer quotes from a field.
fn strip_outer_quotes(field: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = field
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    field
}
