//! Data source modules.
//!
//! Each source translates tool calls into requests against one external
//! API (or the local filesystem for [`flake_inputs`]) and formats the
//! response as plain text. Sources never surface transport errors as MCP
//! failures; they render `Error (CODE): ...` strings instead.

pub mod darwin;
pub mod docs;
pub mod flake_inputs;
pub mod flakehub;
pub mod flakes;
pub mod home_manager;
pub mod nixdev;
pub mod nixhub;
pub mod nixos;
pub mod nixvim;
pub mod noogle;
pub mod wiki;

use crate::common::channels::ChannelCache;
use crate::common::error::ApiError;
use crate::common::http::HttpClient;

/// Shared state handed to every source function: one HTTP client plus the
/// process-lifetime caches.
pub struct SourceContext {
    pub http: HttpClient,
    pub channels: ChannelCache,
    pub nixvim: nixvim::NixvimCache,
    pub nixdev: nixdev::NixDevCache,
    pub noogle: noogle::NoogleCache,
}

impl SourceContext {
    pub fn new() -> Result<Self, ApiError> {
        let http = HttpClient::new()?;
        Ok(Self {
            channels: ChannelCache::new(http.clone()),
            nixvim: nixvim::NixvimCache::new(),
            nixdev: nixdev::NixDevCache::new(),
            noogle: noogle::NoogleCache::new(),
            http,
        })
    }
}
