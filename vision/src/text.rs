//! Fuzzy comparison of OCR output against a searched string.

/// Normalized Levenshtein similarity in `[0, 1]`, case-insensitive.
///
/// Two empty strings are identical (`1.0`).
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let len = a.chars().count().max(b.chars().count());
    if len == 0 {
        return 1.0;
    }
    1.0 - levenshtein::levenshtein(&a, &b) as f32 / len as f32
}

/// Best similarity between `needle` and any part of a recognized line.
///
/// The line is compared whole, and as every run of consecutive words with
/// the same word count as `needle`, so "File" is found in "File Edit View".
pub fn line_similarity(needle: &str, line: &str) -> f32 {
    let needle = needle.trim();
    let words = line.split_whitespace().collect::<Vec<_>>();
    let span = needle.split_whitespace().count().max(1);

    let mut best = similarity(needle, line.trim());
    for run in words.windows(span.min(words.len().max(1))) {
        best = best.max(similarity(needle, &run.join(" ")));
    }
    best
}

/// Best similarity of `needle` across all recognized lines (`0.0` for none).
pub fn best_similarity<S: AsRef<str>>(needle: &str, lines: &[S]) -> f32 {
    lines
        .iter()
        .map(|line| line_similarity(needle, line.as_ref()))
        .fold(0.0, f32::max)
}
