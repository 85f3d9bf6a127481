// crates/quarry-server/src/orchestrator/prompts.rs
// Prompt templates with {{ var }} placeholders

use chrono::Local;

/// System prompt for answer synthesis.
/// Vars: search_context, current_datetime, user_query
pub const ANSWER_PROMPT: &str = "\
You are a search assistant. Answer the user's question using only the search \
context below. Be accurate and concise, write in an unbiased journalistic tone, \
and use markdown. Cite sources inline as [1], [2], ... matching the order of \
the context entries. If the context does not contain the answer, say so.

Search context:
{{ search_context }}

Current date and time: {{ current_datetime }}

Question: {{ user_query }}";

/// User turn that triggers synthesis; the question lives in the system prompt
pub const ANSWER_INSTRUCTION: &str =
    "Please provide a comprehensive answer to the user's question based on the search context provided above.";

/// System prompt for follow-up questions.
/// Vars: user_query, search_context
pub const RELATED_PROMPT: &str = "\
Given a question and the search results used to answer it, suggest exactly 3 \
follow-up questions the user is likely to ask next. Each question must stand on \
its own, be short, and explore a different angle.

Original question: {{ user_query }}

Search results:
{{ search_context }}";

pub const RELATED_INSTRUCTION: &str =
    "Generate 3 follow-up questions based on the question and context above.";

/// System prompt for query decomposition.
/// Vars: user_query, current_datetime
pub const PLAN_PROMPT: &str = "\
Break the user's query into a short plan of at most 4 steps. Every step except \
the last gathers information with web searches. The last step writes the final \
answer from what the earlier steps found.

Give each step a unique integer id and list the ids of earlier steps whose \
results it needs in `dependencies`. A step may only depend on steps that come \
before it. Keep simple queries to 2 steps: one search step and the answer.

Current date and time: {{ current_datetime }}

Query: {{ user_query }}";

/// System prompt for expanding one plan step into search queries.
/// Vars: user_query, current_step, prev_steps_context, current_datetime
pub const SEARCH_QUERY_PROMPT: &str = "\
Write 1 to 3 web search queries that complete the current step of a research \
plan. Queries should be specific, keyword-focused, and different from each \
other. Use the context from previous steps to resolve names and references.

Current date and time: {{ current_datetime }}

User's original query: {{ user_query }}

Context from previous steps:
{{ prev_steps_context }}

Current step to execute: {{ current_step }}";

/// System prompt for single-shot search term extraction.
/// Vars: user_query, current_datetime
pub const SEARCH_TERMS_PROMPT: &str = "\
Rewrite the user's request as a concise web search query. Keep the subject, \
entities, and time constraints. Drop instructions about output format, length, \
or tone. Reply with the search query only.

Current date and time: {{ current_datetime }}

User request:
{{ user_query }}";

/// System prompt for follow-up rewriting
pub const REPHRASE_PROMPT: &str = "\
The user is continuing an earlier conversation. Rewrite their latest message as \
a standalone question that can be understood without the conversation, \
resolving pronouns and references. Reply with the rewritten question only.";

/// Replace every `{{ name }}` placeholder.
///
/// Unknown placeholders are left in place. Values are inserted verbatim and
/// never re-scanned, so a value containing `{{ x }}` stays literal.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = after[..close].trim();
        match vars.iter().find(|(k, _)| *k == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

/// Local time as e.g. "Monday, January 06, 2025 03:04 PM"
pub fn current_datetime() -> String {
    Local::now().format("%A, %B %d, %Y %I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_vars() {
        let out = render("Q: {{ user_query }} at {{current_datetime}}", &[
            ("user_query", "rust"),
            ("current_datetime", "now"),
        ]);
        assert_eq!(out, "Q: rust at now");
    }

    #[test]
    fn test_render_leaves_unknown_and_unclosed() {
        assert_eq!(render("a {{ missing }} b", &[]), "a {{ missing }} b");
        assert_eq!(render("a {{ open", &[("open", "x")]), "a {{ open");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render("{{ a }}", &[("a", "{{ b }}"), ("b", "nope")]);
        assert_eq!(out, "{{ b }}");
    }

    #[test]
    fn test_templates_have_expected_placeholders() {
        for (template, vars) in [
            (ANSWER_PROMPT, &["search_context", "current_datetime", "user_query"][..]),
            (RELATED_PROMPT, &["user_query", "search_context"][..]),
            (PLAN_PROMPT, &["current_datetime", "user_query"][..]),
            (
                SEARCH_QUERY_PROMPT,
                &["current_datetime", "user_query", "prev_steps_context", "current_step"][..],
            ),
            (SEARCH_TERMS_PROMPT, &["current_datetime", "user_query"][..]),
        ] {
            let filled: Vec<(&str, &str)> = vars.iter().map(|v| (*v, "X")).collect();
            let out = render(template, &filled);
            assert!(!out.contains("{{"), "unfilled placeholder in: {}", out);
        }
    }

    #[test]
    fn test_current_datetime_format() {
        let now = current_datetime();
        assert!(now.ends_with("AM") || now.ends_with("PM"));
        assert_eq!(now.matches(',').count(), 2);
    }
}
