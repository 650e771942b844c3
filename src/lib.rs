//! # ragchat
//!
//! Retrieval-augmented chat over uploaded documents.
//!
//! Documents are uploaded (plain text, PDF or DOCX), reduced to one text
//! stream, embedded as a single vector and stored in SQLite. A chat turn
//! embeds the latest user message, pulls the most similar documents into
//! the system message and streams the model's reply back as plain text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Upload  │──▶│ Extract+Embed│──▶│  SQLite  │
//! │ CLI/HTTP │   │   Ingestor   │   │ docs+vec │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │ similarity
//!                                        ▼
//!                 ┌──────────┐     ┌─────────────┐
//!                 │ Chat API │◀───▶│ Orchestrator│──▶ chat model (stream)
//!                 └──────────┘     └─────────────┘
//! ```
//!
//! The pipelines themselves live in `ragchat_core`; this crate supplies the
//! SQLite store, the HTTP provider clients, document extraction, the axum
//! server and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite document store |
//! | [`embedding`] | Embedding provider clients |
//! | [`generation`] | Streaming chat-model clients |
//! | [`extract`] | PDF / DOCX text extraction |
//! | [`services`] | Config-to-collaborator wiring |
//! | [`server`] | HTTP server |
//! | [`ingest`], [`documents`], [`search`], [`chat`] | CLI commands |

pub mod chat;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_store;
