//! Cache key construction.
//!
//! Every cache entry is addressed by a deterministic composite string:
//! `prefix::theme::component::...::k1=v1:k2=v2`. Parameters are serialized in
//! sorted key order, and the delimiter characters are escaped inside keys and
//! values so distinct parameter sets can never collide.

use std::collections::BTreeMap;

/// Separator between the prefix, theme, and key components.
const COMPONENT_SEPARATOR: &str = "::";
/// Separator between serialized parameter pairs.
const PARAM_SEPARATOR: char = ':';
/// Separator between a parameter key and its value.
const PARAM_ASSIGN: char = '=';

/// Build the canonical cache key for the given components and parameters.
///
/// Two calls with identical inputs always produce the same string; parameter
/// order does not matter because pairs are serialized in sorted key order.
pub fn cache_key(
    prefix: &str,
    theme: &str,
    components: &[&str],
    params: &BTreeMap<String, String>,
) -> String {
    let mut builder = CacheKeyBuilder::new(prefix, theme);
    for component in components {
        builder = builder.component(component);
    }
    for (key, value) in params {
        builder = builder.param(key, value);
    }
    builder.build()
}

/// Incremental builder behind [`cache_key`], for callers that assemble keys
/// piece by piece.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    components: Vec<String>,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    pub fn new(prefix: &str, theme: &str) -> Self {
        Self {
            components: vec![escape(prefix), escape(theme)],
            params: BTreeMap::new(),
        }
    }

    pub fn component(mut self, component: &str) -> Self {
        self.components.push(escape(component));
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> String {
        let mut key = self.components.join(COMPONENT_SEPARATOR);
        if !self.params.is_empty() {
            key.push_str(COMPONENT_SEPARATOR);
            let serialized: Vec<String> = self
                .params
                .iter()
                .map(|(name, value)| {
                    format!("{}{PARAM_ASSIGN}{}", escape(name), escape(value))
                })
                .collect();
            key.push_str(&serialized.join(&PARAM_SEPARATOR.to_string()));
        }
        key
    }
}

/// Escape the delimiter characters so they cannot masquerade as structure.
fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            PARAM_SEPARATOR => escaped.push_str("\\:"),
            PARAM_ASSIGN => escaped.push_str("\\="),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn identical_inputs_produce_identical_keys() {
        let first = cache_key("mosaico", "default", &["block", "body"], &params(&[("a", "1")]));
        let second = cache_key("mosaico", "default", &["block", "body"], &params(&[("a", "1")]));
        assert_eq!(first, second);
    }

    #[test]
    fn canonical_shape() {
        let key = cache_key(
            "mosaico",
            "dark",
            &["block", "scripts.site"],
            &params(&[("page", "2"), ("lang", "en")]),
        );
        assert_eq!(key, "mosaico::dark::block::scripts.site::lang=en:page=2");
    }

    #[test]
    fn no_params_means_no_trailing_separator() {
        let key = cache_key("mosaico", "default", &["block", "header"], &BTreeMap::new());
        assert_eq!(key, "mosaico::default::block::header");
    }

    #[test]
    fn escaped_delimiters_cannot_collide() {
        // Without escaping both of these would serialize as `a=x:y`.
        let joined = cache_key("p", "t", &["c"], &params(&[("a", "x:y")]));
        let split = cache_key("p", "t", &["c"], &params(&[("a", "x"), ("y", "")]));
        assert_ne!(joined, split);

        let assigned = cache_key("p", "t", &["c"], &params(&[("a", "x=y")]));
        assert_ne!(joined, assigned);
        assert_ne!(split, assigned);
    }

    #[test]
    fn escaping_covers_the_escape_character_itself() {
        let literal_backslash = cache_key("p", "t", &["c"], &params(&[("a", "x\\:y")]));
        let literal_colon = cache_key("p", "t", &["c"], &params(&[("a", "x:y")]));
        assert_ne!(literal_backslash, literal_colon);
    }

    #[test]
    fn builder_matches_helper() {
        let via_builder = CacheKeyBuilder::new("mosaico", "default")
            .component("block")
            .component("body")
            .param("page", "2")
            .build();
        let via_helper = cache_key(
            "mosaico",
            "default",
            &["block", "body"],
            &params(&[("page", "2")]),
        );
        assert_eq!(via_builder, via_helper);
    }
}
