//! # Conflict RAG Core
//!
//! I/O-free building blocks for conflict-rag: data models, chunking, the
//! embedder trait, the in-memory vector store, and top-k retrieval.
//!
//! This crate performs no network or filesystem access. Concrete embedding
//! providers and the command-line pipeline live in the `conflict-rag` crate.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod retrieve;
pub mod store;
