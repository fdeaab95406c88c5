//! Summarization chains over a loaded chunk set.
//!
//! - `stuff` sends every chunk in one prompt.
//! - `map_reduce` summarizes each chunk, then combines the partial summaries. Partials that do
//!   not fit the prompt budget are collapsed in groups first, for a bounded number of rounds.
//! - `refine` walks the chunks in order and asks the model to refine a running summary.

use super::chunking::TokenCounter;
use super::types::SummaryChain;
use crate::index::DocumentChunk;
use crate::llm::{ChatClient, ChatClientError, ChatRequest};

const MAX_COLLAPSE_ROUNDS: usize = 4;

pub(crate) struct Summarizer<'a> {
    chat: &'a dyn ChatClient,
    model: &'a str,
    temperature: f32,
    max_prompt_tokens: usize,
    token_counter: TokenCounter,
}

impl<'a> Summarizer<'a> {
    pub(crate) fn new(
        chat: &'a dyn ChatClient,
        model: &'a str,
        temperature: f32,
        max_prompt_tokens: usize,
        token_counter: TokenCounter,
    ) -> Self {
        Self {
            chat,
            model,
            temperature,
            max_prompt_tokens: max_prompt_tokens.max(1),
            token_counter,
        }
    }

    pub(crate) async fn summarize(
        &self,
        chunks: &[DocumentChunk],
        chain: SummaryChain,
    ) -> Result<String, ChatClientError> {
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        tracing::debug!(chain = ?chain, chunks = texts.len(), "Summarizing document");
        match chain {
            SummaryChain::Stuff => self.stuff(&texts).await,
            SummaryChain::MapReduce => self.map_reduce(&texts).await,
            SummaryChain::Refine => self.refine(&texts).await,
        }
    }

    async fn stuff(&self, texts: &[&str]) -> Result<String, ChatClientError> {
        let joined = texts.join("\n\n");
        let tokens = self.count(&joined);
        if tokens > self.max_prompt_tokens {
            tracing::warn!(
                tokens,
                budget = self.max_prompt_tokens,
                "Stuff summary exceeds the prompt budget; consider map_reduce"
            );
        }
        self.complete(concise_summary_prompt(&joined)).await
    }

    async fn map_reduce(&self, texts: &[&str]) -> Result<String, ChatClientError> {
        let mut partials = Vec::with_capacity(texts.len());
        for text in texts {
            partials.push(self.complete(concise_summary_prompt(text)).await?);
        }

        for round in 0..MAX_COLLAPSE_ROUNDS {
            if partials.len() <= 1 || self.count(&partials.join("\n\n")) <= self.max_prompt_tokens
            {
                break;
            }
            let groups = self.pack(&partials);
            tracing::debug!(
                round,
                partials = partials.len(),
                groups = groups.len(),
                "Collapsing partial summaries"
            );
            let mut collapsed = Vec::with_capacity(groups.len());
            for group in groups {
                collapsed.push(self.complete(concise_summary_prompt(&group.join("\n\n"))).await?);
            }
            partials = collapsed;
        }

        self.complete(concise_summary_prompt(&partials.join("\n\n")))
            .await
    }

    async fn refine(&self, texts: &[&str]) -> Result<String, ChatClientError> {
        let Some((first, rest)) = texts.split_first() else {
            return self.complete(concise_summary_prompt("")).await;
        };
        let mut summary = self.complete(concise_summary_prompt(first)).await?;
        for text in rest {
            summary = self.complete(refine_prompt(&summary, text)).await?;
        }
        Ok(summary)
    }

    /// Greedily group partial summaries so each group fits the prompt budget. An oversized
    /// summary forms its own group.
    fn pack<'s>(&self, partials: &'s [String]) -> Vec<Vec<&'s str>> {
        let mut groups: Vec<Vec<&str>> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut used = 0usize;
        for partial in partials {
            let tokens = self.count(partial);
            if !current.is_empty() && used + tokens > self.max_prompt_tokens {
                groups.push(std::mem::take(&mut current));
                used = 0;
            }
            current.push(partial.as_str());
            used += tokens;
        }
        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }

    fn count(&self, text: &str) -> usize {
        self.token_counter.as_ref()(text)
    }

    async fn complete(&self, prompt: String) -> Result<String, ChatClientError> {
        let response = self
            .chat
            .complete(ChatRequest {
                model: self.model.to_string(),
                system: None,
                prompt,
                temperature: self.temperature,
            })
            .await?;
        Ok(response.trim().to_string())
    }
}

fn concise_summary_prompt(text: &str) -> String {
    format!("Write a concise summary of the following:\n\n\n\"{text}\"\n\n\nCONCISE SUMMARY:")
}

fn refine_prompt(existing: &str, text: &str) -> String {
    format!(
        "Your job is to produce a final summary.\n\
We have provided an existing summary up to a certain point: {existing}\n\
We have the opportunity to refine the existing summary (only if needed) with some more context below.\n\
------------\n{text}\n------------\n\
Given the new context, refine the original summary.\n\
If the context isn't useful, return the original summary."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::chunking::default_token_counter;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingChat {
        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt);
            Ok(format!(" summary {} ", prompts.len()))
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatClient for FailingChat {
        async fn complete(&self, _request: ChatRequest) -> Result<String, ChatClientError> {
            Err(ChatClientError::ProviderUnavailable("offline".into()))
        }
    }

    fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
        texts.iter().map(|text| DocumentChunk::from(*text)).collect()
    }

    fn summarizer(chat: &dyn ChatClient, budget: usize) -> Summarizer<'_> {
        Summarizer::new(chat, "test-model", 0.0, budget, default_token_counter())
    }

    #[tokio::test]
    async fn stuff_sends_one_prompt_with_every_chunk() {
        let chat = RecordingChat::default();
        let summary = summarizer(&chat, 1_000)
            .summarize(&chunks(&["alpha", "beta"]), SummaryChain::Stuff)
            .await
            .expect("summary");

        assert_eq!(summary, "summary 1");
        let prompts = chat.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("alpha\n\nbeta"));
    }

    #[tokio::test]
    async fn map_reduce_maps_each_chunk_then_combines() {
        let chat = RecordingChat::default();
        let summary = summarizer(&chat, 1_000)
            .summarize(&chunks(&["alpha", "beta", "gamma"]), SummaryChain::MapReduce)
            .await
            .expect("summary");

        let prompts = chat.prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[0].contains("\"alpha\""));
        assert!(prompts[3].contains("summary 1\n\nsummary 2\n\nsummary 3"));
        assert_eq!(summary, "summary 4");
    }

    #[tokio::test]
    async fn map_reduce_collapses_partials_over_budget() {
        let chat = RecordingChat::default();
        // Each partial is two whitespace tokens; a budget of four fits two partials per group.
        summarizer(&chat, 4)
            .summarize(&chunks(&["a", "b", "c", "d"]), SummaryChain::MapReduce)
            .await
            .expect("summary");

        let prompts = chat.prompts();
        // 4 map calls, 2 collapse calls, 1 final combine.
        assert_eq!(prompts.len(), 7);
        assert!(prompts[4].contains("summary 1\n\nsummary 2"));
        assert!(prompts[5].contains("summary 3\n\nsummary 4"));
        assert!(prompts[6].contains("summary 5\n\nsummary 6"));
    }

    #[tokio::test]
    async fn refine_threads_running_summary_through_chunks() {
        let chat = RecordingChat::default();
        let summary = summarizer(&chat, 1_000)
            .summarize(&chunks(&["alpha", "beta", "gamma"]), SummaryChain::Refine)
            .await
            .expect("summary");

        let prompts = chat.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("existing summary up to a certain point: summary 1"));
        assert!(prompts[1].contains("beta"));
        assert!(prompts[2].contains("summary 2"));
        assert_eq!(summary, "summary 3");
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let error = summarizer(&FailingChat, 100)
            .summarize(&chunks(&["alpha"]), SummaryChain::MapReduce)
            .await
            .unwrap_err();
        assert!(matches!(error, ChatClientError::ProviderUnavailable(_)));
    }
}
