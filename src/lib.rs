//! # askdocs
//!
//! Ask a generative model questions about a batch of documents.
//!
//! A batch of files (picked directly, packed in a `.zip`, or mirrored from a
//! shared Drive folder) is read into one plain-text corpus. A prefix of that
//! corpus and the user's question go to the model in a single prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │ Acquisition      │──▶│ Dispatch  │──▶│ Corpus   │──▶│ Query stage  │
//! │ upload/zip/drive │   │ + readers │   │ (+chunks)│   │ Gemini call  │
//! └──────────────────┘   └───────────┘   └──────────┘   └──────────────┘
//!                                                          │
//!                                   ┌──────────────────────┤
//!                                   ▼                      ▼
//!                              ┌──────────┐          ┌──────────┐
//!                              │   CLI    │          │   HTTP   │
//!                              │ (askdocs)│          │  forms   │
//!                              └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! askdocs extract --files report.pdf budget.xlsx
//! askdocs ask --zip quarter.zip --question "What is the profit?"
//! askdocs serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Format readers (PDF, DOCX, XLSX, PPTX, text) |
//! | [`dispatch`] | Extension routing to readers |
//! | [`ingest`] | Corpus assembly |
//! | [`connector_upload`] | Direct file upload |
//! | [`connector_zip`] | Archive upload |
//! | [`connector_drive`] | Google Drive folder mirror |
//! | [`chunk`] | Text chunking |
//! | [`llm`] | Gemini client |
//! | [`query`] | Prompt building and the query state machine |
//! | [`session`] | Corpus and query state for one user |
//! | [`server`] | HTTP form front end |

pub mod chunk;
pub mod config;
pub mod connector_drive;
pub mod connector_upload;
pub mod connector_zip;
pub mod dispatch;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod progress;
pub mod query;
pub mod scratch;
pub mod server;
pub mod session;
pub mod traits;
