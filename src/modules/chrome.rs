//! Page chrome module.
//!
//! Provides the header and footer regions plus the chrome stylesheet. Seeds
//! its settings at init so a fresh install renders something sensible.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::block::BlockName;
use crate::domain::module::Capabilities;
use crate::ports::{RouteOptions, RouteTable, SettingsStore, TemplateRenderer};

use super::{
    InitContext, ModuleError, ModuleHandler, RouteContext, settings_keys, string_setting,
};

pub const MODULE_NAME: &str = "chrome";

const DEFAULT_SITE_TITLE: &str = "Mosaico";
const HEADER_TEMPLATE: &str = "<header class=\"site-header\"><a href=\"/\">{{title}}</a></header>";
const FOOTER_TEMPLATE: &str = "<footer class=\"site-footer\"><small>{{title}}</small></footer>";

pub fn create_chrome_module() -> Arc<dyn ModuleHandler> {
    Arc::new(ChromeModule::new())
}

pub struct ChromeModule {
    routes: RouteTable,
}

impl ChromeModule {
    pub fn new() -> Self {
        let mut routes = RouteTable::new();
        routes.add_route(
            "/*",
            RouteOptions {
                template: Some("chrome".to_string()),
                block: Some(BlockName::new("header").expect("static block name")),
                ..Default::default()
            },
        );
        Self { routes }
    }
}

impl Default for ChromeModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleHandler for ChromeModule {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            init: true,
            route: true,
        }
    }

    async fn init(&self, ctx: &InitContext) -> Result<(), ModuleError> {
        if string_setting(ctx.settings.as_ref(), settings_keys::SITE_TITLE)
            .await?
            .is_none()
        {
            ctx.settings
                .set(settings_keys::SITE_TITLE, json!(DEFAULT_SITE_TITLE))
                .await?;
        }
        Ok(())
    }

    async fn route(&self, ctx: &RouteContext) -> Result<(), ModuleError> {
        if self.routes.matches(&ctx.request.path).is_empty() {
            return Ok(());
        }

        let title = string_setting(ctx.settings.as_ref(), settings_keys::SITE_TITLE)
            .await?
            .unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string());
        let data = json!({ "title": title });

        let header = BlockName::new("header").expect("static block name");
        let footer = BlockName::new("footer").expect("static block name");
        let styles = BlockName::new("styles.chrome").expect("static block name");

        ctx.blocks
            .append(&header, ctx.renderer.render_item(HEADER_TEMPLATE, &data)?);
        ctx.blocks
            .append(&footer, ctx.renderer.render_item(FOOTER_TEMPLATE, &data)?);
        ctx.blocks.append(
            &styles,
            format!(
                "<link rel=\"stylesheet\" href=\"/themes/{}/chrome.css\">",
                ctx.runtime.theme
            ),
        );
        Ok(())
    }
}
