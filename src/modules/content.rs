//! Primary content module.
//!
//! Resolves the requested path to a stored document and renders it into the
//! `body` region, memoizing the rendered block behind the cache store when
//! caching is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::blocks::BlockPiece;
use crate::domain::block::BlockName;
use crate::ports::{ContentSource, RouteOptions, RouteTable, TemplateRenderer};

use super::{ModuleError, ModuleHandler, RouteContext};

pub const MODULE_NAME: &str = "content";

const CONTENT_KIND: &str = "page";
const BODY_TEMPLATE: &str = "<article><h1>{{title}}</h1>{{body}}</article>";
const BODY_LAYOUT: &str = "article";
const NOT_FOUND_BODY: &str = "<article><h1>Not found</h1><p>No content at this path.</p></article>";

pub fn create_content_module() -> Arc<dyn ModuleHandler> {
    Arc::new(ContentModule::new())
}

pub struct ContentModule {
    routes: RouteTable,
}

impl ContentModule {
    pub fn new() -> Self {
        let mut routes = RouteTable::new();
        routes.add_route(
            "/*",
            RouteOptions {
                template: Some("content".to_string()),
                block: Some(BlockName::new("body").expect("static block name")),
                end: true,
                ..Default::default()
            },
        );
        Self { routes }
    }

    /// Document id for a request path: `/` is the home document, everything
    /// else strips the leading slash.
    fn document_id(path: &str) -> &str {
        match path.trim_start_matches('/') {
            "" => "home",
            id => id,
        }
    }
}

impl Default for ContentModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleHandler for ContentModule {
    async fn route(&self, ctx: &RouteContext) -> Result<(), ModuleError> {
        if self.routes.matches(&ctx.request.path).is_empty() {
            return Ok(());
        }

        let body = BlockName::new("body").expect("static block name");
        let cache_key = ctx.cache_key(&["block", body.as_str()]);

        if ctx.runtime.cache_enabled
            && ctx
                .blocks
                .get_cached(ctx.cache.as_ref(), &cache_key, &body)
                .await
                .is_ok()
        {
            return Ok(());
        }

        let document_id = Self::document_id(&ctx.request.path);
        let document = ctx.content.find(CONTENT_KIND, document_id).await?;

        match document {
            Some(document) => {
                let data = render_data(&document);
                let rendered = ctx.renderer.render_item(BODY_TEMPLATE, &data)?;
                ctx.blocks.append(&body, rendered);
                ctx.blocks.append_piece(
                    &body,
                    BlockPiece {
                        id: document_id.to_string(),
                        kind: CONTENT_KIND.to_string(),
                        metadata: document,
                    },
                );

                if ctx.runtime.cache_enabled {
                    ctx.blocks
                        .cache_block(
                            ctx.cache.as_ref(),
                            &cache_key,
                            &body,
                            BODY_LAYOUT,
                            Some(ctx.runtime.cache_ttl),
                        )
                        .await;
                }
            }
            None => {
                debug!(path = %ctx.request.path, "No document for path");
                ctx.blocks.append(&body, NOT_FOUND_BODY);
            }
        }

        Ok(())
    }
}

fn render_data(document: &Value) -> Value {
    json!({
        "title": document.get("title").and_then(Value::as_str).unwrap_or("Untitled"),
        "body": document.get("body").and_then(Value::as_str).unwrap_or(""),
    })
}
