//! # Paper Digest
//!
//! Fetches the newest arXiv papers for a query and has a web-based AI
//! assistant summarize each one, driving the assistant through a real browser.
//!
//! Paper Digest searches arXiv, downloads every paper it has not seen before
//! (pacing downloads with exponential backoff and jitter), uploads each PDF
//! to the assistant in a fresh authenticated browser session, waits for the
//! streamed answer to settle, and saves it as a timestamped Markdown file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │  arXiv API  │──▶│   Fetcher   │──▶│  Submitter   │──▶│ summaries/ │
//! │ Atom + PDFs │   │ backoff+hist│   │ browser+clip │   │  *.md      │
//! └─────────────┘   └─────────────┘   └──────┬───────┘   └────────────┘
//!                                            │
//!                                     ┌──────▼───────┐
//!                                     │   Session    │
//!                                     │ auth_state   │
//!                                     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdigest --init-auth           # log in once in a visible browser
//! pdigest                       # fetch and summarize new papers
//! pdigest --config ./config/digest.toml
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed failures callers branch on |
//! | [`models`] | Core data types |
//! | [`history`] | Processed-paper history file |
//! | [`arxiv`] | arXiv search and download client |
//! | [`backoff`] | Exponential backoff with jitter |
//! | [`fetch`] | New-paper fetcher |
//! | [`surface`] | Browser page capability traits |
//! | [`browser`] | Chromium binding of the page traits |
//! | [`clipboard`] | System clipboard access |
//! | [`session`] | Session bootstrap and restore |
//! | [`submit`] | Upload, wait, extract |
//! | [`pipeline`] | End-to-end orchestration |

pub mod arxiv;
pub mod backoff;
pub mod browser;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod fetch;
pub mod history;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod submit;
pub mod surface;
