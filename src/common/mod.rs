//! Common infrastructure shared by every data source module.
//!
//! # Modules
//!
//! - [`config`] - Endpoints, credentials, channel discovery constants, limits
//! - [`error`] - Typed API errors and plain-text error rendering
//! - [`http`] - Shared HTTP client with Elasticsearch and JSON helpers
//! - [`html`] - HTML stripping and documentation-page option parsing
//! - [`format`] - Small text formatting helpers (counts, sizes, truncation)
//! - [`channels`] - Channel discovery and resolution cache
//! - [`server`] - Main MCP server implementation
//!
//! # Architecture
//!
//! ```text
//! NixScoutServer
//!   ├── SourceContext (shared by all source modules)
//!   │   ├── HttpClient (one reqwest client, per-request timeouts)
//!   │   ├── ChannelCache (lazy index discovery + resolution)
//!   │   └── NixvimCache / NixDevCache / NoogleCache (once-per-process feeds)
//!   └── ToolRouter (two tools: nix, nix_versions)
//! ```

pub mod channels;
pub mod config;
pub mod error;
pub mod format;
pub mod html;
pub mod http;
pub mod server;
