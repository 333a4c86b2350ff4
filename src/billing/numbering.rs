//! Sequential invoice numbering

/// Minimum width of the numeric part of an invoice number
pub const SEQUENCE_WIDTH: usize = 4;

/// Next number in the `prefix` series: one past the highest numeric suffix
/// among `existing`, zero-padded to four digits.
///
/// Numbers whose suffix is not purely numeric are skipped; with nothing to
/// go on the series starts at `0001`. This is a best-effort sequence and does
/// not guard against a concurrent writer taking the same number.
pub fn next_invoice_number<'a>(prefix: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let next = existing
        .into_iter()
        .filter_map(|number| sequence_of(prefix, number))
        .max()
        .map_or(1, |max| max.saturating_add(1));

    format!("{}{:0width$}", prefix, next, width = SEQUENCE_WIDTH)
}

fn sequence_of(prefix: &str, number: &str) -> Option<u64> {
    let suffix = number.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}
