//! Response composition from accumulated blocks.
//!
//! Assembles the final page out of the named regions. Template-language
//! semantics stay with the renderer port; this is plain region stitching:
//! `styles.*` into the head, the five page regions in order, `scripts.*` and
//! the dispatch diagnostics at the end of the body.

use crate::blocks::BlockAccumulator;
use crate::domain::block::{BlockName, BlockPattern};

/// Page regions composed in order.
const REGIONS: [&str; 5] = ["header", "left", "body", "right", "footer"];

/// Block carrying per-request dispatch diagnostics.
pub const DIAGNOSTICS_BLOCK: &str = "diagnostics.dispatch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
}

/// True when the primary content region rendered nothing.
pub fn body_is_empty(blocks: &BlockAccumulator) -> bool {
    let body = BlockName::new("body").expect("static block name");
    blocks
        .get(&body)
        .iter()
        .all(|fragment| fragment.trim().is_empty())
}

/// Compose the response from the accumulated regions.
pub fn compose(blocks: &BlockAccumulator) -> RenderedPage {
    let mut html = String::from("<!doctype html>\n<html>\n<head>\n");

    let styles = BlockPattern::new("styles.*").expect("static pattern");
    for (_, fragments) in blocks.get_by_pattern(&styles) {
        for fragment in fragments {
            html.push_str(&fragment);
            html.push('\n');
        }
    }

    html.push_str("</head>\n<body>\n");

    for region in REGIONS {
        let name = BlockName::new(region).expect("static block name");
        let fragments = blocks.get(&name);
        if fragments.is_empty() {
            continue;
        }
        html.push_str(&format!("<div class=\"region region-{region}\">\n"));
        for fragment in fragments {
            html.push_str(&fragment);
            html.push('\n');
        }
        html.push_str("</div>\n");
    }

    let scripts = BlockPattern::new("scripts.*").expect("static pattern");
    for (_, fragments) in blocks.get_by_pattern(&scripts) {
        for fragment in fragments {
            html.push_str(&fragment);
            html.push('\n');
        }
    }

    let diagnostics = blocks.get(&BlockName::new(DIAGNOSTICS_BLOCK).expect("static block name"));
    if !diagnostics.is_empty() {
        html.push_str("<aside class=\"dispatch-diagnostics\">\n<ul>\n");
        for entry in diagnostics {
            html.push_str(&format!("<li>{entry}</li>\n"));
        }
        html.push_str("</ul>\n</aside>\n");
    }

    html.push_str("</body>\n</html>\n");
    RenderedPage { html }
}
