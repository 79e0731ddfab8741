//! Script injection module.
//!
//! Depends on `content` (declared in its manifest): by the time this module
//! routes, the body block's piece descriptors are complete, so it can emit
//! one script tag per rendered content piece plus the site bundle.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::blocks::BlockPiece;
use crate::domain::block::BlockName;

use super::{ModuleError, ModuleHandler, RouteContext};

pub const MODULE_NAME: &str = "scripts";

pub fn create_scripts_module() -> Arc<dyn ModuleHandler> {
    Arc::new(ScriptsModule)
}

pub struct ScriptsModule;

#[async_trait]
impl ModuleHandler for ScriptsModule {
    async fn route(&self, ctx: &RouteContext) -> Result<(), ModuleError> {
        let body = BlockName::new("body").expect("static block name");
        let scripts = BlockName::new("scripts.site").expect("static block name");

        ctx.blocks.append(
            &scripts,
            format!(
                "<script src=\"/themes/{}/site.js\" defer></script>",
                ctx.runtime.theme
            ),
        );
        ctx.blocks.append_piece(
            &scripts,
            BlockPiece {
                id: "site".to_string(),
                kind: "script".to_string(),
                metadata: json!({"defer": true}),
            },
        );

        // One enhancement hook per content piece the body ended up with.
        for piece in ctx.blocks.pieces(&body) {
            ctx.blocks.append(
                &scripts,
                format!(
                    "<script>mosaico.enhance({});</script>",
                    json!({"id": piece.id, "kind": piece.kind})
                ),
            );
        }

        Ok(())
    }
}
