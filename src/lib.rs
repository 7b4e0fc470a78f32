//! # Conflict-Aware RAG
//!
//! Answers HR policy questions from a folder of plain-text policy files,
//! resolving contradictions between them (intern rules over general
//! employee rules, 2024 updates over the v1 handbook) and citing the file
//! the answer relied on.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────────┐
//! │  data/*.txt │──▶│ Chunk+Embed  │──▶│ InMemoryStore  │
//! │  (loader)   │   │   (index)    │   │ (collection)   │
//! └────────────┘   └──────────────┘   └───────┬────────┘
//!                                             │ top-k
//!                                             ▼
//!                  ┌──────────────┐   ┌────────────────┐
//!                  │  ChatModel   │◀──│ Prompt (rag)   │
//!                  │   (llm)      │   │ [Source: ...]  │
//!                  └──────────────┘   └────────────────┘
//! ```
//!
//! The index lives only for the duration of one command.
//!
//! ## Quick Start
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! crag ask                                  # the built-in intern question
//! crag ask "How many vacation days do I get?"
//! crag retrieve "remote work" -k 5          # ranked sources, no LLM call
//! crag prompt "remote work"                 # rendered prompt, no LLM call
//! crag sources                              # files that would be indexed
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | Data folder ingestion |
//! | [`embedding`] | Embedding providers (Gemini, OpenAI, Ollama) |
//! | [`llm`] | Chat providers (Gemini, OpenAI, Ollama) |
//! | [`index`] | Chunk, embed, and store the corpus |
//! | [`prompt`] | Conflict-aware prompt template |
//! | [`rag`] | Retrieval-augmented answer chain |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod http;
pub mod index;
pub mod llm;
pub mod loader;
pub mod progress;
pub mod prompt;
pub mod rag;
