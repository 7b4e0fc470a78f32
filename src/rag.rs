//! The retrieval-augmented answer chain.
//!
//! `question → embed → retrieve top-k → format context → render prompt →
//! generate`. The chain owns nothing but trait objects, so tests can swap
//! in deterministic embedders and chat models.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use conflict_rag_core::embedding::{embed_query, Embedder};
use conflict_rag_core::retrieve::{retrieve, RetrievalParams, RetrievedDocument};
use conflict_rag_core::store::Store;

use crate::llm::ChatModel;
use crate::prompt::{format_context, PromptTemplate};

/// An answer together with the files it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub question: String,
    pub answer: String,
    /// Source file names of the retrieved context, in rank order.
    pub sources: Vec<String>,
}

pub struct RagChain<'a> {
    store: &'a dyn Store,
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatModel,
    template: PromptTemplate,
    params: RetrievalParams,
}

impl<'a> RagChain<'a> {
    pub fn new(
        store: &'a dyn Store,
        embedder: &'a dyn Embedder,
        chat: &'a dyn ChatModel,
        template: PromptTemplate,
        params: RetrievalParams,
    ) -> Self {
        Self {
            store,
            embedder,
            chat,
            template,
            params,
        }
    }

    /// Retrieve the top-k passages for `question`.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedDocument>> {
        let question = question.trim();
        if question.is_empty() {
            bail!("question must not be empty");
        }
        let query_vec = embed_query(self.embedder, question)
            .await
            .context("Failed to embed the question")?;
        retrieve(self.store, &query_vec, &self.params).await
    }

    /// Render the full prompt for `question`, returning it with the
    /// passages it was built from.
    pub async fn render_prompt(&self, question: &str) -> Result<(String, Vec<RetrievedDocument>)> {
        let docs = self.retrieve(question).await?;
        let prompt = self
            .template
            .render(&format_context(&docs), question.trim());
        Ok((prompt, docs))
    }

    /// Answer `question` with the chat model.
    pub async fn invoke(&self, question: &str) -> Result<RagAnswer> {
        let (prompt, docs) = self.render_prompt(question).await?;
        tracing::debug!(
            model = self.chat.model_name(),
            passages = docs.len(),
            prompt_chars = prompt.len(),
            "generating answer"
        );
        let answer = self.chat.generate(&prompt).await?;
        Ok(RagAnswer {
            question: question.trim().to_string(),
            answer: answer.trim().to_string(),
            sources: docs.into_iter().map(|d| d.source).collect(),
        })
    }
}
