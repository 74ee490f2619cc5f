//! # Pagewise
//!
//! A chat-with-your-documents backend.
//!
//! Pagewise ingests uploaded PDFs (and plain-text files), splits them into
//! embedded passages stored in a per-document SQLite vector namespace, and
//! answers questions about them with retrieval-augmented generation: the
//! question is embedded, the document's most similar passages and the recent
//! conversation window are flattened into one prompt, and a completion model
//! synthesizes the reply. Both sides of every turn are appended to a
//! per-document conversation log.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌───────────┐
//! │  Upload   │──▶│     Ingestion     │──▶│  SQLite    │
//! │ PDF/TXT  │   │ Extract+Chunk+   │   │ documents  │
//! └──────────┘   │      Embed        │   │ passages   │
//!                └───────────────────┘   │ messages   │
//!                                        └─────┬─────┘
//!                    ┌─────────────────────────┤
//!                    ▼                         ▼
//!              ┌──────────┐             ┌──────────┐
//!              │   CLI    │             │   HTTP   │
//!              │(pagewise)│             │  (axum)  │
//!              └──────────┘             └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pagewise init                               # create database
//! pagewise token create --user alice          # mint an API token
//! pagewise ingest ./lease.pdf --user alice    # upload + index a document
//! pagewise ask <document-id> "Who signs?" --user alice
//! pagewise serve                              # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Chat pipeline error taxonomy |
//! | [`extract`] | Text extraction from uploads |
//! | [`chunk`] | Passage splitting |
//! | [`embedding`] | Embedding provider clients |
//! | [`index`] | SQLite vector index |
//! | [`retrieval`] | Query-time similarity search |
//! | [`completion`] | Completion model clients |
//! | [`synthesis`] | Prompt assembly |
//! | [`pipeline`] | Chat turn orchestration |
//! | [`ingest`] | Upload ingestion pipeline |
//! | [`store`] | Document and message persistence |
//! | [`auth`] | Bearer token authentication |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod auth;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod synthesis;
pub mod token_cmd;
