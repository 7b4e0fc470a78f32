//! Command implementations behind the `crag` binary.
//!
//! Each `run_*` function prints its own output to stdout. Progress and
//! diagnostics go to stderr.

use anyhow::Result;

use conflict_rag_core::embedding::Embedder;
use conflict_rag_core::store::memory::InMemoryStore;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::{build_index, index_documents, load_corpus, IndexStats};
use crate::llm::create_chat_model;
use crate::loader;
use crate::progress::{IndexProgressEvent, ProgressReporter};
use crate::prompt::PromptTemplate;
use crate::rag::{RagAnswer, RagChain};

const RULE: &str = "--------------------------------------------------";

/// How `crag ask` ended.
#[derive(Debug)]
pub enum AskOutcome {
    Answered(RagAnswer),
    /// Answering failed; the error has already been printed.
    Failed,
}

/// Answer `question` end to end.
///
/// Setup failures (missing key, missing data folder, unusable template,
/// indexing) are returned as errors. A failure while answering is printed
/// as `Error: ...` between the rules and reported as [`AskOutcome::Failed`].
pub async fn run_ask(
    config: &Config,
    question: &str,
    json: bool,
    progress: &dyn ProgressReporter,
) -> Result<AskOutcome> {
    let embedder = create_embedder(&config.embedding)?;
    let chat = create_chat_model(&config.llm)?;
    let template = PromptTemplate::load(config.prompt.template_path.as_deref())?;

    if !json {
        println!("Starting Conflict-Aware RAG System...");
    }

    progress.report(IndexProgressEvent::Loading {
        dir: config.data.dir.display().to_string(),
    });
    let docs = load_corpus(config)?;
    if !json {
        println!("Loaded {} documents.", docs.len());
    }

    let (store, _) = index_documents(config, docs, embedder.as_ref(), progress).await?;
    if !json {
        println!("Vector Store Indexing Complete.");
    }

    let chain = RagChain::new(
        &store,
        embedder.as_ref(),
        chat.as_ref(),
        template,
        config.retrieval.params(),
    );

    if json {
        return match chain.invoke(question).await {
            Ok(answer) => {
                println!("{}", serde_json::to_string_pretty(&answer)?);
                Ok(AskOutcome::Answered(answer))
            }
            Err(e) => {
                let err = serde_json::json!({ "question": question, "error": format!("{:#}", e) });
                println!("{}", serde_json::to_string_pretty(&err)?);
                Ok(AskOutcome::Failed)
            }
        };
    }

    println!();
    println!("Query: {}", question);
    println!("{}", RULE);

    let outcome = match chain.invoke(question).await {
        Ok(answer) => {
            println!("AI Response:");
            println!("{}", answer.answer);
            AskOutcome::Answered(answer)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "answer failed");
            println!("Error: {:#}", e);
            AskOutcome::Failed
        }
    };
    println!("{}", RULE);

    Ok(outcome)
}

/// Print the passages that would be sent to the model.
pub async fn run_retrieve(
    config: &Config,
    question: &str,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let (store, stats) = build_index(config, embedder.as_ref(), progress).await?;
    let chain = retrieval_only_chain(
        &store,
        embedder.as_ref(),
        PromptTemplate::default(),
        config,
    );

    let results = chain.retrieve(question).await?;
    print_index_summary(config, &stats);

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, result.score, result.source);
        println!(
            "    excerpt: \"{}\"",
            excerpt(&result.text.replace('\n', " "), 240)
        );
        println!();
    }
    Ok(())
}

/// Print the fully rendered prompt without calling the model.
pub async fn run_prompt(
    config: &Config,
    question: &str,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let template = PromptTemplate::load(config.prompt.template_path.as_deref())?;
    let (store, _) = build_index(config, embedder.as_ref(), progress).await?;
    let chain = retrieval_only_chain(&store, embedder.as_ref(), template, config);

    let (prompt, _) = chain.render_prompt(question).await?;
    println!("{}", prompt);
    Ok(())
}

/// List the documents that would be indexed. No network access.
pub fn run_sources(config: &Config) -> Result<()> {
    let docs = loader::load_documents(&config.data)?;
    if docs.is_empty() {
        println!("No documents found in '{}'.", config.data.dir.display());
        return Ok(());
    }

    println!("{:<40} {:>8}  UPDATED", "SOURCE", "BYTES");
    for doc in &docs {
        let date = chrono::DateTime::from_timestamp(doc.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!("{:<40} {:>8}  {}", doc.source_id, doc.body.len(), date);
    }
    println!();
    println!(
        "{} documents in '{}' (collection: {})",
        docs.len(),
        config.data.dir.display(),
        config.retrieval.collection
    );
    Ok(())
}

fn print_index_summary(config: &Config, stats: &IndexStats) {
    println!(
        "collection {}: {} documents, {} chunks, {} dims",
        config.retrieval.collection, stats.documents, stats.chunks, stats.dims
    );
    println!();
}

/// A chain whose chat model is never called.
fn retrieval_only_chain<'a>(
    store: &'a InMemoryStore,
    embedder: &'a dyn Embedder,
    template: PromptTemplate,
    config: &Config,
) -> RagChain<'a> {
    RagChain::new(
        store,
        embedder,
        &NO_CHAT,
        template,
        config.retrieval.params(),
    )
}

struct NoChat;

static NO_CHAT: NoChat = NoChat;

#[async_trait::async_trait]
impl crate::llm::ChatModel for NoChat {
    fn model_name(&self) -> &str {
        "none"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("no chat model configured for this command")
    }
}

/// Truncate to at most `max_chars` characters, adding `...` when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
