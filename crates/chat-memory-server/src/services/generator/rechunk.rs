/// Split a provider increment into word-sized pieces for smoother display.
///
/// Whitespace stays attached to the preceding word, so the pieces always
/// concatenate back to `text` byte for byte.
pub fn rechunk(text: &str) -> Vec<String> {
    text.split_inclusive(|c: char| c == ' ' || c == '\n')
        .map(str::to_string)
        .collect()
}
