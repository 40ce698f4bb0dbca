//! # Reclaim
//!
//! A lost-and-found matching backend.
//!
//! Users submit a photo of a found item or a text description of a lost
//! item; the backend captions and embeds the submission, stores it in
//! Postgres, indexes the embedding in a vector collection, and returns the
//! top-K most similar opposite-type items as candidate matches — all in the
//! request path.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────┐   ┌──────────────┐
//! │  HTTP    │──▶│     Matching Pipeline      │──▶│  Postgres    │
//! │ (axum)   │   │ upload → embed → persist   │   │ items/matches│
//! └──────────┘   │  → index → search → record │   └──────────────┘
//!                └──────┬──────────┬──────────┘
//!                       ▼          ▼
//!               ┌────────────┐ ┌────────────┐
//!               │  OpenAI    │ │  Qdrant +  │
//!               │ caption/   │ │  object    │
//!               │ embeddings │ │  storage   │
//!               └────────────┘ └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! reclaimd init --config ./reclaim.toml    # create schema + collection
//! reclaimd serve --config ./reclaim.toml   # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error taxonomy |
//! | [`models`] | Core data types |
//! | [`traits`] | Capability seams for the four backends |
//! | [`embedding`] | OpenAI caption + embedding provider |
//! | [`storage`] | Object storage client |
//! | [`index`] | Vector index client |
//! | [`db`] | Postgres pool construction |
//! | [`store`] | Relational store |
//! | [`migrate`] | Schema migrations |
//! | [`pipeline`] | The matching pipeline |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod store;
pub mod traits;
