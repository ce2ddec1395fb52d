//! # Topic Harvest
//!
//! A resumable, rate-limit-aware batch collector for short social posts.
//!
//! Topic Harvest searches a configured list of topics through a pool of
//! upstream identities, expands the reply threads of the most engaged posts,
//! and stores everything in SQLite. Progress is checkpointed after every
//! topic, so an interrupted or failed run picks up where it stopped when it is
//! started again the same day.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Source pool │──▶│ Fetch engine│──▶│  Expander   │──▶│  SQLite  │
//! │ (gateway)   │   │  batches    │   │ top-N reply │   │ runs +   │
//! └─────────────┘   └──────┬──────┘   └─────────────┘   │ items    │
//!                          │                            └──────────┘
//!                          ▼
//!                   ┌─────────────┐
//!                   │ Checkpoint  │
//!                   │   (JSON)    │
//!                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init          # create database
//! harvest               # run the pipeline (resumes today's run if interrupted)
//! harvest status        # inspect the checkpoint
//! harvest stats         # recent runs
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`checkpoint`] | Durable run progress |
//! | [`pacing`] | Delays and safety timeouts |
//! | [`source`] | Source pool abstraction |
//! | [`source_http`] | HTTP pool gateway client |
//! | [`fetch`] | Batched topic search |
//! | [`expand`] | Engagement ranking and reply threads |
//! | [`store`] | Item persistence |
//! | [`pipeline`] | Stage controller |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod expand;
pub mod fetch;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod pacing;
pub mod pipeline;
pub mod source;
pub mod source_http;
pub mod stats;
pub mod status;
pub mod store;

pub use error::{HarvestError, Result};
