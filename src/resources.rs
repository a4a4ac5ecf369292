//! Knowledge resource URIs and payloads.
//!
//! Read-only JSON views of the knowledge tree, addressed by `knowledge://`
//! URIs:
//!
//! * `knowledge://index` — top-level collections and documents
//! * `knowledge://{path}/index` — contents of one collection
//! * `knowledge://{path}/info` — metadata of one document
//!
//! The MCP bridge serves these as resources; the payload builders stay
//! protocol-free so they can be tested against a plain [`KnowledgeBase`].
//! Every embedded path goes through the facade, so traversal attempts in a
//! URI fail the same way they do everywhere else.

use std::path::Path;

use serde_json::{json, Value};

use crate::errors::AccessError;
use crate::knowledge::KnowledgeBase;

pub const ROOT_INDEX_URI: &str = "knowledge://index";

pub fn collection_index_uri(path: &str) -> String {
    format!("knowledge://{path}/index")
}

pub fn document_info_uri(path: &str) -> String {
    format!("knowledge://{path}/info")
}

/// A parsed `knowledge://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    RootIndex,
    CollectionIndex(String),
    DocumentInfo(String),
}

/// Parses a `knowledge://` URI. Returns `None` for anything that is not
/// one of the three recognized forms.
pub fn parse_uri(uri: &str) -> Option<ResourceRequest> {
    let rest = uri.strip_prefix("knowledge://")?;
    if rest == "index" {
        return Some(ResourceRequest::RootIndex);
    }
    if let Some(path) = rest.strip_suffix("/index") {
        if !path.is_empty() {
            return Some(ResourceRequest::CollectionIndex(path.to_string()));
        }
    }
    if let Some(path) = rest.strip_suffix("/info") {
        if !path.is_empty() {
            return Some(ResourceRequest::DocumentInfo(path.to_string()));
        }
    }
    None
}

/// Builds the JSON payload for a parsed resource request.
pub async fn read(
    knowledge: &KnowledgeBase,
    request: &ResourceRequest,
) -> Result<Value, AccessError> {
    match request {
        ResourceRequest::RootIndex => root_index(knowledge),
        ResourceRequest::CollectionIndex(path) => collection_index(knowledge, path),
        ResourceRequest::DocumentInfo(path) => {
            let info = knowledge.document_info(path).await?;
            serde_json::to_value(info).map_err(|err| AccessError::Io(err.into()))
        }
    }
}

fn root_index(knowledge: &KnowledgeBase) -> Result<Value, AccessError> {
    let listing = knowledge.list_collections("")?;
    let collections: Vec<Value> = listing
        .collections
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "path": name,
                "type": "collection"
            })
        })
        .collect();
    let documents: Vec<Value> = listing
        .documents
        .iter()
        .map(|name| document_item(name, name))
        .collect();
    Ok(json!({
        "collections": collections,
        "documents": documents
    }))
}

fn collection_index(knowledge: &KnowledgeBase, path: &str) -> Result<Value, AccessError> {
    let listing = knowledge.list_collections(path)?;
    let mut items: Vec<Value> = Vec::new();
    for name in &listing.collections {
        items.push(json!({
            "name": name,
            "path": child_path(&listing.path, name),
            "type": "collection"
        }));
    }
    for name in &listing.documents {
        items.push(document_item(name, &child_path(&listing.path, name)));
    }
    Ok(json!({
        "path": listing.path,
        "items": items
    }))
}

fn document_item(name: &str, path: &str) -> Value {
    let format = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    json!({
        "name": name,
        "path": path,
        "type": "document",
        "format": format
    })
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
