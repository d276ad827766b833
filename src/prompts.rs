//! Prompt templates for the composer.
//!
//! Templates use `{name}` placeholders filled by [`render`] in a single
//! pass, so substituted text containing braces is never re-expanded.

/// Rewrites a follow-up question into a standalone one.
pub const CONDENSE_QUESTION_TEMPLATE: &str = "Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

/// Answers a question from retrieved lore, in the voice of a sage.
pub const LORE_QA_TEMPLATE: &str = r#"SYSTEM: You are a loremaster with knowledge of the setting and world of a Dungeons and Dragons campaign, and answer user questions about the history of the setting and previous events that have transpired in the course of the campaign.
---
Stylise your answers as though you are roleplaying a wise old sage or loremaster who is providing wisdom to fantasy characters in the Dungeons and Dragons campaign.
Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.
Ensure the answer fits within a {max_length} character limit, and try to AVOID beginning every answer with "Ah, ...".

{context}

Question: {question}
Loremaster's Answer:"#;

/// Retells the most recent session as a bard's tale.
pub const LAST_SESSION_TEMPLATE: &str = r#"SYSTEM: You are a loremaster with knowledge of the setting and world of a Dungeons and Dragons campaign.
Your job is to synthesise a summary of what happened in the last session of the story/campaign, given a clinical summary of said session (and a collection of summaries of sessions before that for additional context).
---
Stylise your answers as though you are roleplaying a charismatic storyteller/bard who is regaling the fantasy characters in the Dungeons and Dragons campaign with a tale of the exploits in the previous session.
Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.
Ensure the answer fits within a {max_length} character limit, and try to AVOID beginning every answer with "Ah, ...".

--- CONTEXT - PREVIOUS SESSION SUMMARIES ---

{previous_summaries_context}

--- CONTEXT - LAST SESSION SUMMARY ---

{last_session_context}

--- STORY OF LAST SESSION BEGINS ---

Question: Tell me the story of what happened in the last session.
Storyteller's Answer:"#;

/// Substitute `{name}` placeholders. Unknown placeholders are left as is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v, close))
        });
        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render conversation turns as `\nHuman: …\nAssistant: …` blocks.
pub fn format_history(history: &[(String, String)]) -> String {
    history
        .iter()
        .map(|(human, ai)| format!("\nHuman: {}\nAssistant: {}", human, ai))
        .collect()
}

pub fn condense_question(history: &[(String, String)], question: &str) -> String {
    let chat_history = format_history(history);
    render(
        CONDENSE_QUESTION_TEMPLATE,
        &[("chat_history", chat_history.as_str()), ("question", question)],
    )
}

pub fn lore_qa(context: &str, question: &str, max_length: usize) -> String {
    let max_length = max_length.to_string();
    render(
        LORE_QA_TEMPLATE,
        &[
            ("context", context),
            ("question", question),
            ("max_length", max_length.as_str()),
        ],
    )
}

pub fn last_session(previous: &str, last: &str, max_length: usize) -> String {
    let max_length = max_length.to_string();
    render(
        LAST_SESSION_TEMPLATE,
        &[
            ("previous_summaries_context", previous),
            ("last_session_context", last),
            ("max_length", max_length.as_str()),
        ],
    )
}
