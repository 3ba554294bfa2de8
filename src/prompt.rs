//! Flattens retrieved context and chat history into a single completion prompt.
//!
//! No truncation happens here: callers with token-limited backends bound `history` and the
//! fragment count before assembling.

use crate::conversation::ConversationTurn;
use crate::embeddings::Fragment;

/// Marker appended after the last turn to signal where generation starts.
pub const GENERATION_MARKER: &str = "ASSISTANT:";

/// Serialises fragment texts, in retrieval order, as a JSON array.
///
/// An empty slice yields `[]` so the context block is never silently omitted.
pub fn context_block(fragments: &[Fragment]) -> String {
    let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
    serde_json::to_string(&texts).unwrap_or_else(|_| String::from("[]"))
}

/// Builds the grounding instruction embedding `context` and `question` verbatim.
pub fn system_turn(context: &str, question: &str) -> ConversationTurn {
    let mut content = String::new();
    content.push_str(
        "You are a helpful assistant. Use the following context to answer the user's question.\n",
    );
    content.push_str(
        "The context may be empty. If it does not contain the answer, say that the provided context does not cover the question.\n",
    );
    content.push_str("-------------\n");
    content.push_str("START CONTEXT\n");
    content.push_str(context);
    content.push_str("\nEND CONTEXT\n");
    content.push_str("-------------\n");
    content.push_str("QUESTION: ");
    content.push_str(question);
    ConversationTurn::system(content)
}

/// Assembles the full prompt: grounding turn, then `history`, then the generation marker.
pub fn assemble(fragments: &[Fragment], history: &[ConversationTurn], question: &str) -> String {
    let system = system_turn(&context_block(fragments), question);
    let mut prompt = String::new();
    for turn in std::iter::once(&system).chain(history) {
        prompt.push_str(turn.role.prompt_label());
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }
    prompt.push_str(GENERATION_MARKER);
    prompt
}
