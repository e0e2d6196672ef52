//! nix-darwin options, parsed from the published manual page.

use crate::common::config::DARWIN_URL;
use crate::sources::docs::{self, DocSet};
use crate::sources::SourceContext;

const SET: DocSet = DocSet {
    url: DARWIN_URL,
    label: "nix-darwin",
    scan_limit: 3000,
};

pub async fn search(ctx: &SourceContext, query: &str, limit: usize) -> String {
    docs::search(ctx, &SET, query, limit).await
}

pub async fn info(ctx: &SourceContext, name: &str) -> String {
    docs::info(ctx, &SET, name).await
}

pub async fn stats(ctx: &SourceContext) -> String {
    docs::stats(ctx, &SET).await
}

pub async fn browse(ctx: &SourceContext, prefix: &str) -> String {
    docs::browse(ctx, &SET, prefix).await
}
