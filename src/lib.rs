//! # Photo Curator
//!
//! A consensus-based dataset curation engine for photo embedding collections.
//!
//! Photo Curator selects a representative subset of a target size from a
//! collection of image embeddings. A single randomized selection run (FPS or
//! K-Means medoids) is sensitive to its seed, so the engine runs many
//! independent seeded iterations and ranks items by how often they are
//! chosen. Operators can pin ("lock") high-confidence items out of further
//! contention and re-run curation on the remainder.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────────┐   ┌───────────┐
//! │  embeddings │──▶│   Selector     │──▶│ Consensus │
//! │   (SQLite)  │   │ FPS / K-Means  │   │ frequency │
//! └─────────────┘   └────────────────┘   └─────┬─────┘
//!                                              │
//!                            ┌─────────────────┤
//!                            ▼                 ▼
//!                       ┌──────────┐     ┌──────────┐
//!                       │   CLI    │     │   HTTP   │
//!                       │  (pcur)  │     │  (jobs)  │
//!                       └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pcur init                          # create the store database
//! pcur import embeddings.jsonl       # load image embeddings
//! pcur curate --target 50 --iterations 10 --method fps
//! pcur serve                         # start the curation HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Embedding store boundary (SQLite + in-memory snapshot) |
//! | [`selector`] | FPS and K-Means medoid selection |
//! | [`consensus`] | Multi-iteration consensus aggregation |
//! | [`session`] | Operator lock/exclusion session |
//! | [`progress`] | Per-iteration progress reporting |
//! | [`jobs`] | Asynchronous curation jobs with progress polling |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod consensus;
pub mod db;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod selector;
pub mod server;
pub mod session;
pub mod store;
