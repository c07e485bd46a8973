//! Text normalization for provider-supplied labels

/// First letter upper-cased, remainder lower-cased.
///
/// `"MODERATE AIR QUALITY"` and `"moderate air quality"` both become
/// `"Moderate air quality"`. Surrounding whitespace is trimmed.
pub fn sentence_case(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut chars = lowered.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Canonical pollutant code: lower-case, no dots or spaces (`"PM2.5"` -> `"pm25"`).
pub fn pollutant_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '.' | ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}
