//! Colloquy — conversation and simulation orchestration for persona agents.
//!
//! Holds a conversation between a user and one or more persona agents, each
//! grounded in a bundle of free-text knowledge documents, and runs one-shot
//! simulation scenarios from placeholder templates. Persistence, auth, and
//! the language model itself are external collaborators reached over plain
//! request/response calls.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod logging;
pub mod providers;
pub mod store;
pub mod types;
