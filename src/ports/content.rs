//! Persistence port.
//!
//! A generic document source keyed by content kind and id, carrying opaque
//! JSON documents. Schema design stays with the collaborator.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "ports::content";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content backend unavailable: {message}")]
    Backend { message: String },
}

impl ContentError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Find one document by kind and id; `None` when absent.
    async fn find(&self, kind: &str, id: &str) -> Result<Option<Value>, ContentError>;
    /// List every document of a kind, in id order.
    async fn list(&self, kind: &str) -> Result<Vec<Value>, ContentError>;
    /// Create or replace a document.
    async fn save(&self, kind: &str, id: &str, document: Value) -> Result<(), ContentError>;
    /// Remove a document; removing an absent document is not an error.
    async fn remove(&self, kind: &str, id: &str) -> Result<(), ContentError>;
}

/// In-memory document store for the host binary and tests.
#[derive(Debug, Default)]
pub struct MemoryContent {
    documents: RwLock<BTreeMap<(String, String), Value>>,
}

impl MemoryContent {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentSource for MemoryContent {
    async fn find(&self, kind: &str, id: &str) -> Result<Option<Value>, ContentError> {
        let documents = rw_read(&self.documents, SOURCE, "find");
        Ok(documents
            .get(&(kind.to_string(), id.to_string()))
            .cloned())
    }

    async fn list(&self, kind: &str) -> Result<Vec<Value>, ContentError> {
        let documents = rw_read(&self.documents, SOURCE, "list");
        Ok(documents
            .iter()
            .filter(|((doc_kind, _), _)| doc_kind == kind)
            .map(|(_, document)| document.clone())
            .collect())
    }

    async fn save(&self, kind: &str, id: &str, document: Value) -> Result<(), ContentError> {
        let mut documents = rw_write(&self.documents, SOURCE, "save");
        documents.insert((kind.to_string(), id.to_string()), document);
        Ok(())
    }

    async fn remove(&self, kind: &str, id: &str) -> Result<(), ContentError> {
        let mut documents = rw_write(&self.documents, SOURCE, "remove");
        documents.remove(&(kind.to_string(), id.to_string()));
        Ok(())
    }
}
