/// Argument validation and dispatch tests for the two MCP tools.
/// Every case here fails validation before any network or subprocess
/// activity, so the tests run offline.
use nixscout_mcp::common::server::{
    dispatch_nix, dispatch_nix_versions, NixArgs, NixScoutServer, NixVersionsArgs,
};
use nixscout_mcp::sources::SourceContext;

fn ctx() -> SourceContext {
    SourceContext::new().expect("http client")
}

fn nix_args(action: &str) -> NixArgs {
    NixArgs {
        action: action.to_string(),
        query: None,
        source: None,
        r#type: None,
        channel: None,
        limit: None,
        version: None,
        system: None,
    }
}

// ========== nix tool ==========

#[tokio::test]
async fn test_invalid_action() {
    let out = dispatch_nix(&ctx(), nix_args("explode")).await;
    assert_eq!(
        out,
        "Error (ERROR): Action must be search|info|stats|options|channels|flake-inputs|cache"
    );
}

#[tokio::test]
async fn test_limit_bounds() {
    for limit in [0, 101] {
        let mut args = nix_args("search");
        args.limit = Some(limit);
        let out = dispatch_nix(&ctx(), args).await;
        assert_eq!(out, "Error (ERROR): Limit must be 1-100", "limit {}", limit);
    }
}

#[tokio::test]
async fn test_flake_inputs_read_limit_bounds() {
    let mut args = nix_args("flake-inputs");
    args.r#type = Some("read".to_string());
    args.limit = Some(2001);
    let out = dispatch_nix(&ctx(), args).await;
    assert_eq!(out, "Error (ERROR): Limit must be 1-2000 for flake-inputs read");

    // A large limit that is legal for reads is rejected everywhere else.
    let mut args = nix_args("search");
    args.query = Some("ripgrep".to_string());
    args.limit = Some(1500);
    let out = dispatch_nix(&ctx(), args).await;
    assert_eq!(out, "Error (ERROR): Limit must be 1-100");
}

#[tokio::test]
async fn test_search_requires_query() {
    let out = dispatch_nix(&ctx(), nix_args("search")).await;
    assert_eq!(out, "Error (ERROR): Query required for search");
}

#[tokio::test]
async fn test_search_rejects_unknown_source() {
    let mut args = nix_args("search");
    args.query = Some("git".to_string());
    args.source = Some("gentoo".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert!(out.contains("Source must be nixos|home-manager|darwin|flakes"));
}

#[tokio::test]
async fn test_search_nixos_rejects_bad_type() {
    let mut args = nix_args("search");
    args.query = Some("git".to_string());
    args.r#type = Some("modules".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert_eq!(out, "Error (ERROR): Type must be packages|options|programs|flakes");
}

#[tokio::test]
async fn test_info_requires_name() {
    let out = dispatch_nix(&ctx(), nix_args("info")).await;
    assert_eq!(out, "Error (ERROR): Name required for info");
}

#[tokio::test]
async fn test_info_nixos_rejects_bad_type() {
    let mut args = nix_args("info");
    args.query = Some("git".to_string());
    args.r#type = Some("programs".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert_eq!(out, "Error (ERROR): Type must be package|option");
}

#[tokio::test]
async fn test_info_not_available_for_nixdev() {
    let mut args = nix_args("info");
    args.query = Some("flakes".to_string());
    args.source = Some("nix-dev".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert!(out.contains("Info not available for nix-dev"));
}

#[tokio::test]
async fn test_info_rejects_flakes_source() {
    let mut args = nix_args("info");
    args.query = Some("home-manager".to_string());
    args.source = Some("flakes".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert!(out.starts_with("Error (ERROR): Source must be"));
}

#[tokio::test]
async fn test_stats_unavailable_sources() {
    for source in ["wiki", "nix-dev", "nixhub"] {
        let mut args = nix_args("stats");
        args.source = Some(source.to_string());
        let out = dispatch_nix(&ctx(), args).await;
        assert_eq!(
            out,
            format!("Error (ERROR): Stats not available for {}", source)
        );
    }
}

#[tokio::test]
async fn test_options_only_for_browsable_sources() {
    let mut args = nix_args("options");
    args.source = Some("nixos".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert_eq!(
        out,
        "Error (ERROR): Options browsing only for home-manager|darwin|nixvim|noogle"
    );
}

#[tokio::test]
async fn test_flake_inputs_rejects_bad_type() {
    let mut args = nix_args("flake-inputs");
    args.r#type = Some("write".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert_eq!(out, "Error (ERROR): Type must be list|ls|read for flake-inputs");
}

#[tokio::test]
async fn test_flake_inputs_ls_requires_query() {
    let mut args = nix_args("flake-inputs");
    args.r#type = Some("ls".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert_eq!(
        out,
        "Error (ERROR): Query required for ls (input name or input:path)"
    );
}

#[tokio::test]
async fn test_flake_inputs_read_requires_query() {
    let mut args = nix_args("flake-inputs");
    args.r#type = Some("read".to_string());
    let out = dispatch_nix(&ctx(), args).await;
    assert_eq!(
        out,
        "Error (ERROR): Query required for read (input:path format)"
    );
}

#[tokio::test]
async fn test_cache_requires_package() {
    let out = dispatch_nix(&ctx(), nix_args("cache")).await;
    assert_eq!(out, "Error (ERROR): Package name required for cache action");
}

// ========== nix_versions tool ==========

#[tokio::test]
async fn test_versions_requires_package() {
    let args = NixVersionsArgs {
        package: "   ".to_string(),
        version: None,
        limit: None,
    };
    let out = dispatch_nix_versions(&ctx(), args).await;
    assert_eq!(out, "Error (ERROR): Package name required");
}

#[tokio::test]
async fn test_versions_rejects_invalid_package_name() {
    for package in ["foo bar", "pkg;rm -rf /", "a/b", "hello!"] {
        let args = NixVersionsArgs {
            package: package.to_string(),
            version: None,
            limit: None,
        };
        let out = dispatch_nix_versions(&ctx(), args).await;
        assert_eq!(out, "Error (ERROR): Invalid package name", "package {}", package);
    }
}

#[tokio::test]
async fn test_versions_limit_bounds() {
    for limit in [0, 51] {
        let args = NixVersionsArgs {
            package: "ripgrep".to_string(),
            version: None,
            limit: Some(limit),
        };
        let out = dispatch_nix_versions(&ctx(), args).await;
        assert_eq!(out, "Error (ERROR): Limit must be 1-50", "limit {}", limit);
    }
}

// ========== server construction ==========

#[test]
fn test_server_constructs() {
    let server = NixScoutServer::new().expect("server");
    // The shared context is reachable for administrative resets.
    let _ctx = server.context();
}
