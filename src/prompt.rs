//! Prompt templates.
//!
//! Three layers, applied in order for every query:
//!
//! 1. [`legal_prompt`] wraps the raw question with legal-analysis
//!    instructions and the persona disclaimer. This text is also what gets
//!    embedded for retrieval.
//! 2. [`qa_prompt`] places the retrieved chunks above the legal prompt and
//!    asks the model to answer from that context.
//! 3. [`instruction_prompt`] adds the `[INST]` markers expected by
//!    instruction-tuned models on the raw completions endpoint.

use crate::index::RetrievedChunk;

pub fn legal_prompt(query: &str, disclaimer: &str) -> String {
    format!(
        "As a legal AI assistant with expertise in document analysis, please provide a professional analysis \
of the following query, based on the available documentation. Consider relevant legal context and implications.

Query: {query}

Please provide a clear, well-structured response that:
1. Addresses the specific legal aspects of the query
2. References relevant information from the provided documents
3. Maintains professional legal terminology where appropriate
4. Includes necessary context and explanations

{disclaimer}

Analysis:"
    )
}

/// Question-answering prompt over retrieved context.
///
/// Each chunk is preceded by a `file_name:` line so the model can cite the
/// source document.
pub fn qa_prompt(context: &[RetrievedChunk], query: &str) -> String {
    let context_str = context
        .iter()
        .map(|c| format!("file_name: {}\n\n{}", c.document, c.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.
---------------------
{context_str}
---------------------
Given the context information and not prior knowledge, answer the query.
Query: {query}
Answer: "
    )
}

pub fn instruction_prompt(completion: &str) -> String {
    format!("<s>[INST] {} [/INST] </s>\n", completion)
}

/// Final answer: trimmed generated text, a blank line, then the disclaimer.
pub fn format_response(generated: &str, disclaimer: &str) -> String {
    format!("{}\n\n{}", generated.trim(), disclaimer)
}
