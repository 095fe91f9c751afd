//! MCP multi-server chat client
//!
//! An interactive command-line client that launches Model Context Protocol
//! servers as subprocesses, gathers every tool they expose, and lets a
//! hosted chat-completions model call those tools while answering queries.
//!
//! # Architecture
//!
//! - **Config**: JSON server file plus layered model settings (defaults, env, CLI)
//! - **MCP Client**: subprocess servers over stdio via `rmcp`, tools namespaced per server
//! - **Agent**: tool loop over an OpenAI-compatible Chat Completions API
//! - **REPL**: sequential query loop with JSON rendering of each turn
//!
//! # Modules
//!
//! - [`app`]: startup sequence and teardown
//! - [`config`]: CLI and model client settings
//! - [`llm`]: LLM driver traits, chat-completions driver and agent
//! - [`mcp`]: MCP server configuration, connections and tool descriptors
//! - [`normalized`]: unified streaming event model
//! - [`repl`]: interactive query loop
//! - [`response`]: agent transcripts and their rendering

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]

pub mod app;
pub mod config;
pub mod llm;
pub mod mcp;
pub mod normalized;
pub mod repl;
pub mod response;
