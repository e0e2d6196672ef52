//! MCP server implementation.
//!
//! The whole tool surface is two tools: `nix` (a multiplexer over every
//! data source) and `nix_versions` (NixHub version history). Argument
//! validation and routing live in plain async functions so they can be
//! exercised directly by tests; the `#[tool]` methods are thin wrappers.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};

use crate::common::config::{DEFAULT_LINE_LIMIT, KNOWN_SOURCES, MAX_LINE_LIMIT};
use crate::common::error::{error, ApiError};
use crate::sources::{
    darwin, flake_inputs, flakehub, flakes, home_manager, nixdev, nixhub, nixos, nixvim, noogle,
    wiki, SourceContext,
};

static PACKAGE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_.]+$").unwrap());

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct NixArgs {
    /// search|info|stats|options|channels|flake-inputs|cache
    pub action: String,
    /// Search term, name, or prefix. For flake-inputs: input_name or input:path
    pub query: Option<String>,
    /// nixos|home-manager|darwin|flakes|flakehub|nixvim|wiki|nix-dev|noogle|nixhub
    pub source: Option<String>,
    /// packages|options|programs|list|ls|read
    pub r#type: Option<String>,
    /// unstable|stable|25.05
    pub channel: Option<String>,
    /// 1-100 (or 1-2000 for flake-inputs read)
    pub limit: Option<usize>,
    /// Version for cache action (default: latest)
    pub version: Option<String>,
    /// System for cache action (e.g., x86_64-linux). Empty for all.
    pub system: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct NixVersionsArgs {
    /// Package name
    pub package: String,
    /// Specific version to find
    pub version: Option<String>,
    /// 1-50
    pub limit: Option<usize>,
}

const SOURCE_LIST: &str =
    "Source must be nixos|home-manager|darwin|flakes|flakehub|nixvim|wiki|nix-dev|noogle|nixhub";

/// Route one `nix` tool call. Always returns text; failures are rendered
/// as `Error (CODE): ...` lines.
pub async fn dispatch_nix(ctx: &SourceContext, args: NixArgs) -> String {
    let action = args.action.as_str();
    let query = args.query.unwrap_or_default();
    let source = args.source.unwrap_or_else(|| "nixos".to_string());
    let arg_type = args.r#type.unwrap_or_else(|| "packages".to_string());
    let channel = args.channel.unwrap_or_else(|| "unstable".to_string());
    let limit = args.limit.unwrap_or(20);
    let version = args.version.unwrap_or_else(|| "latest".to_string());
    let system = args.system.unwrap_or_default();

    // Limit validation: flake-inputs read allows up to 2000 lines, every
    // other action caps at 100 results.
    if action == "flake-inputs" && arg_type == "read" {
        if !(1..=MAX_LINE_LIMIT).contains(&limit) {
            return error(format!("Limit must be 1-{} for flake-inputs read", MAX_LINE_LIMIT));
        }
    } else if !(1..=100).contains(&limit) {
        return error("Limit must be 1-100");
    }

    match action {
        "search" => {
            if query.is_empty() {
                return error("Query required for search");
            }
            match source.as_str() {
                "nixos" => {
                    if !["packages", "options", "programs", "flakes"].contains(&arg_type.as_str())
                    {
                        return error("Type must be packages|options|programs|flakes");
                    }
                    nixos::search(ctx, &query, &arg_type, limit, &channel).await
                }
                "home-manager" => home_manager::search(ctx, &query, limit).await,
                "darwin" => darwin::search(ctx, &query, limit).await,
                "flakes" => flakes::search(ctx, &query, limit).await,
                "flakehub" => flakehub::search(ctx, &query, limit).await,
                "nixvim" => nixvim::search(ctx, &query, limit).await,
                "wiki" => wiki::search(ctx, &query, limit).await,
                "nix-dev" => nixdev::search(ctx, &query, limit).await,
                "noogle" => noogle::search(ctx, &query, limit).await,
                "nixhub" => nixhub::search(ctx, &query, limit).await,
                _ => error(SOURCE_LIST),
            }
        }

        "info" => {
            if query.is_empty() {
                return error("Name required for info");
            }
            match source.as_str() {
                "nixos" => {
                    if !["package", "packages", "option", "options"].contains(&arg_type.as_str())
                    {
                        return error("Type must be package|option");
                    }
                    let info_type = if arg_type.starts_with("package") {
                        "package"
                    } else {
                        "option"
                    };
                    nixos::info(ctx, &query, info_type, &channel).await
                }
                "home-manager" => home_manager::info(ctx, &query).await,
                "darwin" => darwin::info(ctx, &query).await,
                "flakehub" => flakehub::info(ctx, &query).await,
                "nixvim" => nixvim::info(ctx, &query).await,
                "wiki" => wiki::info(ctx, &query).await,
                "nix-dev" => {
                    error("Info not available for nix-dev. Use search to find docs, then visit the URL.")
                }
                "noogle" => noogle::info(ctx, &query).await,
                "nixhub" => nixhub::info(ctx, &query).await,
                _ => error(
                    "Source must be nixos|home-manager|darwin|flakehub|nixvim|wiki|nix-dev|noogle|nixhub",
                ),
            }
        }

        "stats" => match source.as_str() {
            "nixos" => nixos::stats(ctx, &channel).await,
            "home-manager" => home_manager::stats(ctx).await,
            "darwin" => darwin::stats(ctx).await,
            "flakes" => flakes::stats(ctx).await,
            "flakehub" => flakehub::stats(ctx).await,
            "nixvim" => nixvim::stats(ctx).await,
            "noogle" => noogle::stats(ctx).await,
            "wiki" | "nix-dev" | "nixhub" => error(format!("Stats not available for {}", source)),
            _ => error(SOURCE_LIST),
        },

        "options" => match source.as_str() {
            "nixvim" => nixvim::browse(ctx, &query).await,
            "noogle" => noogle::browse(ctx, &query).await,
            "home-manager" => home_manager::browse(ctx, &query).await,
            "darwin" => darwin::browse(ctx, &query).await,
            _ => error("Options browsing only for home-manager|darwin|nixvim|noogle"),
        },

        "channels" => nixos::list_channels(ctx).await,

        "flake-inputs" => {
            // The source argument doubles as the flake directory when it
            // is not a known source name.
            let flake_dir = if KNOWN_SOURCES.contains(&source.as_str()) {
                "."
            } else {
                source.as_str()
            };

            // "packages" is the default type and accepted as an alias for
            // "list" here.
            match arg_type.as_str() {
                "list" | "packages" => flake_inputs::list(flake_dir).await,
                "ls" => {
                    if query.is_empty() {
                        return error("Query required for ls (input name or input:path)");
                    }
                    flake_inputs::ls(flake_dir, &query).await
                }
                "read" => {
                    if query.is_empty() {
                        return error("Query required for read (input:path format)");
                    }
                    // The generic default of 20 means "unset" for reads.
                    let read_limit = if limit == 20 {
                        DEFAULT_LINE_LIMIT
                    } else {
                        limit.min(MAX_LINE_LIMIT)
                    };
                    flake_inputs::read(flake_dir, &query, read_limit).await
                }
                _ => error("Type must be list|ls|read for flake-inputs"),
            }
        }

        "cache" => {
            if query.is_empty() {
                return error("Package name required for cache action");
            }
            nixhub::check_binary_cache(ctx, &query, &version, &system).await
        }

        _ => error("Action must be search|info|stats|options|channels|flake-inputs|cache"),
    }
}

/// Route one `nix_versions` tool call.
pub async fn dispatch_nix_versions(ctx: &SourceContext, args: NixVersionsArgs) -> String {
    let package = args.package;
    let version = args.version.unwrap_or_default();
    let limit = args.limit.unwrap_or(10);

    if package.trim().is_empty() {
        return error("Package name required");
    }
    if !PACKAGE_NAME.is_match(&package) {
        return error("Invalid package name");
    }
    if !(1..=50).contains(&limit) {
        return error("Limit must be 1-50");
    }

    nixhub::versions(ctx, &package, &version, limit).await
}

#[derive(Clone)]
pub struct NixScoutServer {
    tool_router: ToolRouter<NixScoutServer>,
    ctx: Arc<SourceContext>,
}

#[tool_router]
impl NixScoutServer {
    pub fn new() -> Result<Self, ApiError> {
        Ok(Self {
            tool_router: Self::tool_router(),
            ctx: Arc::new(SourceContext::new()?),
        })
    }

    pub fn context(&self) -> &SourceContext {
        &self.ctx
    }

    #[tool(
        description = "Query NixOS, Home Manager, Darwin, flakes, FlakeHub, Nixvim, Wiki, nix.dev, Noogle, NixHub, or flake inputs",
        annotations(read_only_hint = true)
    )]
    pub async fn nix(
        &self,
        Parameters(args): Parameters<NixArgs>,
    ) -> Result<CallToolResult, McpError> {
        let text = dispatch_nix(&self.ctx, args).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Get package version history from NixHub.io",
        annotations(read_only_hint = true)
    )]
    pub async fn nix_versions(
        &self,
        Parameters(args): Parameters<NixVersionsArgs>,
    ) -> Result<CallToolResult, McpError> {
        let text = dispatch_nix_versions(&self.ctx, args).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for NixScoutServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "This server searches the Nix ecosystem and formats everything as plain text. \
                \n\n=== nix TOOL === \
                \n\nActions: \
                \n- search: find packages, options, programs, flakes, wiki articles, docs, or functions \
                \n- info: detailed information about one package, option, flake, or function \
                \n- stats: document counts and category breakdowns per source \
                \n- options: browse Home Manager, nix-darwin, Nixvim, or Noogle by prefix \
                \n- channels: list NixOS channels with live availability \
                \n- flake-inputs: list, ls, or read files from a local flake's inputs \
                \n- cache: binary cache status for a package on cache.nixos.org \
                \n\nSources: nixos (default), home-manager, darwin, flakes, flakehub, nixvim, wiki, nix-dev, noogle, nixhub \
                \n\nChannels: unstable (default), stable, beta, or a release like 25.05. \
                Channel names are resolved against the live search backend and fall back to a \
                static table when discovery fails. \
                \n\n=== nix_versions TOOL === \
                \n\nVersion history for a package from NixHub.io, including nixpkgs commits \
                for pinning specific versions."
                    .to_string(),
            ),
        }
    }
}
