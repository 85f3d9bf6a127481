// crates/quarry-server/src/search/digest.rs
// Textual digests of search results for prompt context

use quarry_types::SearchHit;

/// Budget for one step's context digest, in characters
pub const STEP_CONTEXT_CHARS: usize = 7000;

/// Budget for the cross-step synthesis context, in characters
pub const SYNTHESIS_CONTEXT_CHARS: usize = 10000;

/// Budget for the related-questions context, in characters
pub const RELATED_CONTEXT_CHARS: usize = 4000;

/// Truncate to at most `max_chars` characters, never splitting a character
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// One step's hits joined one per line and cut to the step budget
pub fn step_digest(hits: &[SearchHit]) -> String {
    let joined = hits.iter().map(|h| h.to_string()).collect::<Vec<_>>().join("\n");
    truncate_chars(&joined, STEP_CONTEXT_CHARS).to_string()
}

/// Numbered citations for the single-shot answer prompt
pub fn citation_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("Citation {}. {}", i + 1, h))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Section of the synthesis context contributed by one step
pub fn synthesis_section(step: &str, digest: &str) -> String {
    format!(
        "Everything below is context for step: {}\nContext: {}\n{}\n",
        step,
        digest,
        "-".repeat(20)
    )
}

/// Join step sections and cut to the synthesis budget
pub fn synthesis_context<'a>(sections: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let joined = sections
        .into_iter()
        .map(|(step, digest)| synthesis_section(step, digest))
        .collect::<Vec<_>>()
        .join("\n");
    truncate_chars(&joined, SYNTHESIS_CONTEXT_CHARS).to_string()
}

/// Hits joined with blank lines, cut for the related-questions prompt
pub fn related_context(hits: &[SearchHit]) -> String {
    let joined = hits.iter().map(|h| h.to_string()).collect::<Vec<_>>().join("\n\n");
    truncate_chars(&joined, RELATED_CONTEXT_CHARS).to_string()
}
