//! Home Manager options, parsed from the published options page.

use crate::common::config::HOME_MANAGER_URL;
use crate::sources::docs::{self, DocSet};
use crate::sources::SourceContext;

const SET: DocSet = DocSet {
    url: HOME_MANAGER_URL,
    label: "Home Manager",
    scan_limit: 5000,
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
