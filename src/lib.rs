//! Conversational state and similarity cache backing an agentic portfolio
//! site, in a strictly linted crate.

// No unsafe, no undocumented public items.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![deny(unused_must_use)]
#![forbid(unsafe_op_in_unsafe_fn)]
// No unwrap/expect/panic outside test code.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::print_stdout))]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(overflowing_literals)]

/// Boundary to the external agent/LLM layer and its collaborators.
pub mod orchestrator;
/// Per-request progress relay between worker and stream handler.
pub mod progress;
/// HTTP server and API routes.
pub mod server;
/// Entry helpers to start the portfolio agent server.
pub mod start_folio_agent;
/// Session-scoped conversational state: transcripts, revision cache,
/// similarity search, and backends.
pub mod state;
