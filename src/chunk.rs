//! Paragraph-boundary text chunker.
//!
//! Splits raw document text on blank lines (`\n\n`) to preserve semantic
//! coherence within each chunk. A document with no paragraph structure
//! (at most one non-empty paragraph) falls back to single-line splitting.
//!
//! Segments are trimmed, and anything at or below the minimum character
//! threshold is dropped so stray punctuation and single words do not
//! pollute the index. The returned iterator is finite, restartable (call
//! again on the same text), and preserves document order.
//!
//! Known limitation: no maximum chunk size is imposed, so a pathological
//! document with no line breaks at all becomes a single chunk.

/// Split text into meaningful chunks in document order.
///
/// A segment is meaningful when its trimmed length exceeds `min_chars`
/// characters.
pub fn chunk_text(text: &str, min_chars: usize) -> impl Iterator<Item = &str> {
    let paragraphs = text
        .split("\n\n")
        .filter(|segment| !segment.trim().is_empty())
        .count();
    // No paragraph structure: fall back to single line breaks.
    let separator = if paragraphs > 1 { "\n\n" } else { "\n" };

    text.split(separator)
        .map(str::trim)
        .filter(move |segment| segment.chars().count() > min_chars)
}
