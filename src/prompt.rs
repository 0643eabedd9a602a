//! Prompt composition for grounded generation.
//!
//! A pure function from retrieved documents to the system-level grounding
//! instruction. Documents are joined by a blank line, preserving the
//! chunker's paragraph semantics, and the instruction explicitly permits
//! the generator to say the answer is not in the context instead of
//! inventing one. With no retrieved documents it falls back to a generic
//! assistant instruction with no context section.

const GENERIC_INSTRUCTION: &str = "You are a helpful local AI assistant running entirely on the \
user's device. Be concise and helpful.";

/// Build the system-level instruction for the generation provider.
pub fn compose(retrieved_documents: &[String]) -> String {
    if retrieved_documents.is_empty() {
        return GENERIC_INSTRUCTION.to_string();
    }

    let context = retrieved_documents.join("\n\n");
    format!(
        "You are a helpful local AI assistant. You have access to the following context from the \
user's documents:\n\n{context}\n\nUse this context to answer the user's question. If the answer \
isn't in the context, say so and provide a general helpful response."
    )
}
