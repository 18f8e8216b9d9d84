//! ChatVault - Private local data routing for a terminal AI assistant
//!
//! ChatVault sits between a terminal chat client and a remote chat model.
//! Messages that ask to save, show, change or forget personal data are
//! answered from a local SQLite store and never leave the machine; all
//! other messages are forwarded to an OpenAI-compatible chat service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐      ┌──────────────────────────────────────────────┐
//! │ chatvault    │ TCP  │               Warm process (serve)            │
//! │ send / ping  ├─────►│  ┌────────────────────────────────────────┐   │
//! │ (supervisor) │◄─────┤  │ Server: one JSON request per connection│   │
//! └──────────────┘      │  └───────────────────┬────────────────────┘   │
//!                       │                      ▼                        │
//!                       │  ┌────────────────────────────────────────┐   │
//!                       │  │ Pipeline                               │   │
//!                       │  │  session ─► triggers ─► intent         │   │
//!                       │  └──────┬───────────────────────┬─────────┘   │
//!                       │         │ local action          │ NORMAL      │
//!                       │         ▼                       ▼             │
//!                       │  ┌──────────────┐       ┌──────────────┐      │
//!                       │  │ handlers     │       │ chat         │──────┼─► remote API
//!                       │  │ extract      │       │ (history in  │      │
//!                       │  │ query        │       │  the store)  │      │
//!                       │  └──────┬───────┘       └──────┬───────┘      │
//!                       │         ▼                      ▼              │
//!                       │  ┌────────────────────────────────────────┐   │
//!                       │  │ store: SQLite (optionally SQLCipher)   │   │
//!                       │  └────────────────────────────────────────┘   │
//!                       └──────────────────────────────────────────────┘
//!                                     │ models
//!                                     ▼
//!                           local model runner (ollama)
//! ```
//!
//! ## Modules
//!
//! - [`triggers`]: cheap keyword gate in front of the model
//! - [`intent`]: model-backed classification with a rule fallback
//! - [`extract`]: per-action payload extraction
//! - [`query`]: parameterized statements and the safety validator
//! - [`handlers`]: one handler per local action
//! - [`pipeline`]: routing of a single message
//! - [`server`]: the warm process and its wire protocol
//! - [`supervisor`]: starting, probing and stopping processes
//! - [`config`]: configuration management

pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod intent;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod triggers;

pub use config::ChatVaultConfig;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, Reply};
