//! Prompt assembly for retrieval-augmented answers.

use crate::index::RetrievedChunk;

pub(crate) const ANSWER_SYSTEM_PROMPT: &str =
    "You answer questions about a document using only the excerpts you are given.";

/// Stuff every retrieved chunk into a single prompt ahead of the question.
pub(crate) fn build_answer_prompt(question: &str, context: &[RetrievedChunk]) -> String {
    let excerpts = context
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
{excerpts}\n\nQuestion: {question}\nHelpful Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_context_in_retrieval_order() {
        let context = vec![
            RetrievedChunk {
                text: "Ferris is a crab.".into(),
                score: 0.9,
            },
            RetrievedChunk {
                text: "Crabs walk sideways.".into(),
                score: 0.4,
            },
        ];
        let prompt = build_answer_prompt("What is Ferris?", &context);

        let first = prompt.find("Ferris is a crab.").expect("first excerpt");
        let second = prompt.find("Crabs walk sideways.").expect("second excerpt");
        assert!(first < second);
        assert!(prompt.ends_with("Question: What is Ferris?\nHelpful Answer:"));
    }

    #[test]
    fn prompt_without_context_still_carries_question() {
        let prompt = build_answer_prompt("Anything?", &[]);
        assert!(prompt.contains("Question: Anything?"));
    }
}
