//! Model Context Protocol (MCP) client side.
//!
//! Servers are launched as subprocesses and spoken to over stdio with
//! `rmcp`. Every tool they expose becomes a [`tool::ToolDescriptor`] the
//! agent can call.
//!
//! # Configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "time": {
//!       "command": "npx",
//!       "args": ["-y", "@mcpcentral/mcp-time"]
//!     },
//!     "search": {
//!       "command": "search-mcp",
//!       "args": [],
//!       "env": { "SEARCH_API_KEY": "${SEARCH_API_KEY}" }
//!     }
//!   }
//! }
//! ```
//!
//! # Tool Namespacing
//!
//! Tools are namespaced by server name: `server__tool` (e.g. `time__now`).
//! Same-named tools on different servers therefore stay separately callable.

pub mod config;
pub mod registry;
pub mod tool;

pub use registry::{SessionGuards, ToolHub};
pub use tool::ToolDescriptor;
