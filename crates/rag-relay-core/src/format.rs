//! Renders retrieved passages into a prompt-ready text block.

use crate::models::RetrievalResult;

/// Rendered in place of the context block when nothing was retrieved.
pub const NO_CONTEXT: &str = "No relevant context found.";

const HEADER: &str = "Retrieved Context:\n\n";

/// Formats contexts in rank order as `[Source: …]` tagged blocks separated
/// by blank lines.
///
/// ```rust
/// use rag_relay_core::format::format_contexts;
/// use rag_relay_core::models::RetrievalResult;
///
/// assert_eq!(format_contexts(&RetrievalResult::empty()), "No relevant context found.");
/// ```
pub fn format_contexts(contexts: &RetrievalResult) -> String {
    if contexts.is_empty() {
        return NO_CONTEXT.to_string();
    }

    let mut out = String::from(HEADER);
    for ctx in contexts {
        out.push_str("[Source: ");
        out.push_str(&ctx.source);
        out.push_str("]\n");
        out.push_str(&ctx.text);
        out.push_str("\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedContext;

    fn ctx(rank: usize, source: &str, text: &str) -> RetrievedContext {
        RetrievedContext {
            rank,
            text: text.to_string(),
            source: source.to_string(),
            distance: None,
        }
    }

    #[test]
    fn test_empty() {
        assert_eq!(format_contexts(&RetrievalResult::empty()), NO_CONTEXT);
    }

    #[test]
    fn test_blocks_in_rank_order() {
        let contexts: RetrievalResult = vec![
            ctx(1, "gs://b/legal/msa.pdf", "Either party may terminate with 30 days notice."),
            ctx(2, "unknown", "Termination for cause is immediate."),
        ]
        .into();

        let formatted = format_contexts(&contexts);
        assert_eq!(
            formatted,
            "Retrieved Context:\n\n\
             [Source: gs://b/legal/msa.pdf]\nEither party may terminate with 30 days notice.\n\n\
             [Source: unknown]\nTermination for cause is immediate.\n\n"
        );
        assert_eq!(formatted.matches("[Source: ").count(), 2);
    }

    #[test]
    fn test_idempotent() {
        let contexts: RetrievalResult = vec![ctx(1, "s", "t")].into();
        assert_eq!(format_contexts(&contexts), format_contexts(&contexts));
    }
}
