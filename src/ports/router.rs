//! Per-module route tables.
//!
//! Each module registers the paths it answers within its own namespace. The
//! pattern language is deliberately minimal — exact paths and a trailing `*`
//! wildcard — because routing syntax is a collaborator concern, not part of
//! the coordination core.

use crate::domain::block::BlockName;

/// Options attached to a registered route.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Template to render for this route.
    pub template: Option<String>,
    /// Block the rendered output targets.
    pub block: Option<BlockName>,
    /// Restrict the route to the administrative context.
    pub admin: bool,
    /// Named authorization predicate evaluated by the host.
    pub permit: Option<String>,
    /// Stop evaluating further routes once this one matches.
    pub end: bool,
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pattern: String,
    pub options: RouteOptions,
}

impl RouteEntry {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn matches(&self, path: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => self.pattern == path,
        }
    }
}

/// Ordered route registrations for one module.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, pattern: impl Into<String>, options: RouteOptions) -> &mut Self {
        self.routes.push(RouteEntry {
            pattern: pattern.into(),
            options,
        });
        self
    }

    /// Every route matching `path`, in registration order, honoring `end`.
    pub fn matches(&self, path: &str) -> Vec<&RouteEntry> {
        let mut matched = Vec::new();
        for route in &self.routes {
            if route.matches(path) {
                matched.push(route);
                if route.options.end {
                    break;
                }
            }
        }
        matched
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_wildcard_matching() {
        let mut table = RouteTable::new();
        table.add_route("/about", RouteOptions::default());
        table.add_route("/posts/*", RouteOptions::default());

        assert_eq!(table.matches("/about").len(), 1);
        assert_eq!(table.matches("/posts/hello").len(), 1);
        assert!(table.matches("/missing").is_empty());
    }

    #[test]
    fn end_stops_further_evaluation() {
        let mut table = RouteTable::new();
        table.add_route(
            "/*",
            RouteOptions {
                end: true,
                ..Default::default()
            },
        );
        table.add_route("/*", RouteOptions::default());

        assert_eq!(table.matches("/anything").len(), 1);
    }

    #[test]
    fn matches_preserve_registration_order() {
        let mut table = RouteTable::new();
        table.add_route(
            "/*",
            RouteOptions {
                template: Some("first".to_string()),
                ..Default::default()
            },
        );
        table.add_route(
            "/*",
            RouteOptions {
                template: Some("second".to_string()),
                ..Default::default()
            },
        );

        let matched = table.matches("/page");
        assert_eq!(matched[0].options.template.as_deref(), Some("first"));
        assert_eq!(matched[1].options.template.as_deref(), Some("second"));
    }
}
