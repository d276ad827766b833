//! # Loremaster
//!
//! Campaign-lore retrieval for a tabletop setting kept in a Notion database.
//!
//! Loremaster keeps a vector collection in step with the Notion workspace
//! (incremental sync) and answers questions against it, either as general
//! Q&A over retrieved lore or as a retelling of the most recent session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌──────────┐   ┌──────────────┐
//! │  Notion  │──▶│ Chunk + Tag    │──▶│   Diff   │──▶│ Synchronizer │
//! │  source  │   │ sessions       │   │ vs index │   │ delete/insert│
//! └──────────┘   └────────────────┘   └──────────┘   └──────┬───────┘
//!                                                           ▼
//!                  ┌──────────────┐                  ┌──────────────┐
//!                  │   Composer   │◀─────────────────│ SQLite store │
//!                  │ Q&A / recap  │                  │ vectors+JSON │
//!                  └──────────────┘                  └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lore init                       # create database
//! lore sync                       # incremental sync from Notion
//! lore ask "Who rules the Eastern Marches?"
//! lore last-session               # bard's retelling of the last session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, chunks and stored records |
//! | [`source`] | Document sources (Notion) |
//! | [`chunk`] | Text chunking and session tagging |
//! | [`diff`] | Change detection against the store |
//! | [`sync`] | Vector store synchronization |
//! | [`embedding`] | Embedding model abstraction |
//! | [`generation`] | Chat model abstraction |
//! | [`store`] | Vector store trait and backends |
//! | [`compose`] | Q&A and last-session flows |
//! | [`prompts`] | Prompt templates |
//! | [`reply`] | Reply length bounding |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod compose;
pub mod config;
pub mod db;
pub mod diff;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod prompts;
pub mod reply;
pub mod source;
pub mod stats;
pub mod store;
pub mod sync;

pub use error::{LoreError, Result};
