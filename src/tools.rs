//! Agent-facing tools over the knowledge base.
//!
//! The six built-ins wrap one facade operation each and share a single
//! dispatch surface: the REST routes, the MCP endpoint, and embedders
//! linking the crate directly. Compiled extensions implement [`Tool`]
//! and register next to the built-ins; there is no other extension
//! mechanism, so anything a tool can reach goes through
//! [`ToolContext`] and inherits its confinement.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::knowledge::KnowledgeBase;

// ============ Tool trait ============

/// One callable operation, discoverable by agents.
///
/// The schema and description are advertised on `GET /tools/list` and
/// through MCP discovery; invocation arrives as a JSON object either on
/// `POST /tools/{name}` or an MCP `tools/call`. Implementations validate
/// their own parameters and bail with a message naming the offending
/// field, which the server maps to a 400.
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use docfort::tools::{Tool, ToolContext};
///
/// struct RootName;
///
/// #[async_trait]
/// impl Tool for RootName {
///     fn name(&self) -> &str { "root_name" }
///     fn description(&self) -> &str { "Report the knowledge root's collections" }
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         let listing = ctx.knowledge().list_collections("")?;
///         Ok(json!({ "collections": listing.collections }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier, also the route segment of `POST /tools/{name}`.
    /// Lowercase with underscores by convention.
    fn name(&self) -> &str;

    /// One line telling an agent when to pick this tool.
    fn description(&self) -> &str;

    /// Built-ins report `true`; the tool list carries the flag so clients
    /// can tell shipped tools from operator extensions.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema for the parameter object (`type: "object"` with
    /// `properties` and optionally `required`).
    fn parameters_schema(&self) -> Value;

    /// Runs the tool. `params` is always a JSON object; the returned value
    /// is wrapped as `{ "result": ... }` on the wire.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ============ ToolContext ============

/// Context bridge for tool execution.
///
/// Gives tools access to the knowledge base during execution. Custom tools
/// get the same facade the built-ins use, nothing more: every operation
/// stays behind path validation, the filter policy, and the search limits.
#[derive(Clone)]
pub struct ToolContext {
    knowledge: Arc<KnowledgeBase>,
}

impl ToolContext {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    /// The shared knowledge base facade.
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }
}

// ============ Built-in tools ============

fn optional_u32(params: &Value, key: &str) -> Result<Option<u32>> {
    match params.get(key).and_then(Value::as_u64) {
        Some(value) => Ok(Some(
            u32::try_from(value).with_context(|| format!("{key} is out of range"))?,
        )),
        None => Ok(None),
    }
}

fn optional_usize(params: &Value, key: &str) -> Option<usize> {
    params.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

fn scope_args(params: &Value) -> (Option<&str>, Option<&str>) {
    (
        params.get("collection").and_then(Value::as_str),
        params.get("document").and_then(Value::as_str),
    )
}

/// Built-in boolean search over the knowledge root.
pub struct SearchDocumentsTool;

#[async_trait]
impl Tool for SearchDocumentsTool {
    fn name(&self) -> &str {
        "search_documents"
    }

    fn description(&self) -> &str {
        "Search documents with a boolean query (terms AND by default, | for OR, -term to exclude, \"...\" for phrases)"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Boolean search expression" },
                "collection": { "type": "string", "description": "Restrict the search to one collection" },
                "document": { "type": "string", "description": "Restrict the search to one document" },
                "max_results": { "type": "integer", "description": "Result cap for this search" },
                "context_lines": { "type": "integer", "description": "Context lines around each match" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            anyhow::bail!("query must not be empty");
        }

        let (collection, document) = scope_args(&params);
        let scope = ctx.knowledge().scope(collection, document)?;
        let result = ctx
            .knowledge()
            .search_documents(
                query,
                scope,
                optional_usize(&params, "max_results"),
                optional_usize(&params, "context_lines"),
            )
            .await?;
        Ok(serde_json::to_value(&result)?)
    }
}

/// Built-in fan-out search for several queries at once.
pub struct SearchMultipleTool;

#[async_trait]
impl Tool for SearchMultipleTool {
    fn name(&self) -> &str {
        "search_multiple"
    }

    fn description(&self) -> &str {
        "Run several boolean searches in parallel and collect per-query results"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Boolean search expressions"
                },
                "collection": { "type": "string", "description": "Restrict all searches to one collection" },
                "document": { "type": "string", "description": "Restrict all searches to one document" }
            },
            "required": ["queries"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let queries: Vec<String> = params["queries"]
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if queries.is_empty() {
            anyhow::bail!("queries must be a non-empty array of strings");
        }
        if queries.len() > 20 {
            anyhow::bail!("at most 20 queries per call");
        }

        let (collection, document) = scope_args(&params);
        let scope = ctx.knowledge().scope(collection, document)?;
        let outcomes = ctx.knowledge().search_multiple(&queries, scope).await;

        let results: Vec<Value> = outcomes
            .into_iter()
            .map(|(query, outcome)| match outcome {
                Ok(result) => json!({ "query": query, "result": result }),
                Err(err) => json!({
                    "query": query,
                    "error": { "code": err.code(), "message": err.to_string() }
                }),
            })
            .collect();
        Ok(json!({ "results": results }))
    }
}

/// Built-in document reader.
pub struct ReadDocumentTool;

#[async_trait]
impl Tool for ReadDocumentTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "Read a document's text content, optionally restricted to a page range"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Document path relative to the knowledge root" },
                "first_page": { "type": "integer", "description": "First page to read (paginated formats only)" },
                "last_page": { "type": "integer", "description": "Last page to read (paginated formats only)" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = params["path"].as_str().unwrap_or("");
        if path.trim().is_empty() {
            anyhow::bail!("path must not be empty");
        }

        let first_page = optional_u32(&params, "first_page")?;
        let last_page = optional_u32(&params, "last_page")?;
        let pages = match (first_page, last_page) {
            (Some(first), Some(last)) => Some((first, last)),
            (None, None) => None,
            _ => anyhow::bail!("first_page and last_page must be given together"),
        };

        let content = ctx.knowledge().read_document(path, pages).await?;
        Ok(serde_json::to_value(&content)?)
    }
}

/// Built-in document metadata tool.
pub struct DocumentInfoTool;

#[async_trait]
impl Tool for DocumentInfoTool {
    fn name(&self) -> &str {
        "document_info"
    }

    fn description(&self) -> &str {
        "Get a document's size, modification time, page count and outline"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Document path relative to the knowledge root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = params["path"].as_str().unwrap_or("");
        if path.trim().is_empty() {
            anyhow::bail!("path must not be empty");
        }

        let info = ctx.knowledge().document_info(path).await?;
        Ok(serde_json::to_value(&info)?)
    }
}

/// Built-in collection listing tool.
pub struct ListCollectionsTool;

#[async_trait]
impl Tool for ListCollectionsTool {
    fn name(&self) -> &str {
        "list_collections"
    }

    fn description(&self) -> &str {
        "List the collections and documents directly under a path"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Collection path; empty for the knowledge root" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = params["path"].as_str().unwrap_or("");
        let listing = ctx.knowledge().list_collections(path)?;
        Ok(serde_json::to_value(&listing)?)
    }
}

/// Built-in filename lookup tool.
pub struct FindDocumentTool;

#[async_trait]
impl Tool for FindDocumentTool {
    fn name(&self) -> &str {
        "find_document"
    }

    fn description(&self) -> &str {
        "Find documents by name, with substring or glob matching"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Substring or glob to match against file names" },
                "limit": { "type": "integer", "description": "Maximum hits to return", "default": 20 }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let pattern = params["pattern"].as_str().unwrap_or("");
        if pattern.trim().is_empty() {
            anyhow::bail!("pattern must not be empty");
        }

        let limit = optional_usize(&params, "limit").unwrap_or(20).min(100);
        let hits = ctx.knowledge().find_documents(pattern, limit)?;
        Ok(json!({ "documents": hits }))
    }
}

// ============ Registry ============

/// Ordered collection of tools, resolved by name.
///
/// [`with_builtins`](ToolRegistry::with_builtins) seeds the six document
/// tools; [`register`](ToolRegistry::register) appends customs after
/// them. Lookup takes the first name match, so registration order is the
/// precedence order.
///
/// ```rust
/// use docfort::tools::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find("read_document").is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry seeded with the six built-in document tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchDocumentsTool));
        registry.register(Box::new(SearchMultipleTool));
        registry.register(Box::new(ReadDocumentTool));
        registry.register(Box::new(DocumentInfoTool));
        registry.register(Box::new(ListCollectionsTool));
        registry.register(Box::new(FindDocumentTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Every registered tool, in registration order.
    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// First tool registered under `name`, if any.
    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, KnowledgeConfig};
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> ToolContext {
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/a.md"), "# A\n").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello\n").unwrap();
        let config = Config {
            knowledge: KnowledgeConfig {
                root: dir.path().to_path_buf(),
                follow_symlinks: false,
            },
            search: Default::default(),
            limits: Default::default(),
            filters: Default::default(),
            server: Default::default(),
        };
        ToolContext::new(Arc::new(KnowledgeBase::new(&config).unwrap()))
    }

    #[test]
    fn builtins_cover_the_document_operations() {
        let registry = ToolRegistry::with_builtins();
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "search_documents",
                "search_multiple",
                "read_document",
                "document_info",
                "list_collections",
                "find_document"
            ]
        );
        assert!(registry.find("read_document").is_some());
        assert!(registry.find("absent").is_none());
        assert!(registry.tools().iter().all(|t| t.is_builtin()));
    }

    #[tokio::test]
    async fn list_collections_tool_returns_the_listing() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let value = ListCollectionsTool
            .execute(json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(value["collections"], json!(["docs"]));
        assert_eq!(value["documents"], json!(["readme.txt"]));
    }

    #[tokio::test]
    async fn find_document_tool_finds_by_pattern() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let value = FindDocumentTool
            .execute(json!({ "pattern": "a.md" }), &ctx)
            .await
            .unwrap();
        assert_eq!(value["documents"][0]["path"], "docs/a.md");
    }

    #[tokio::test]
    async fn empty_parameters_are_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        assert!(SearchDocumentsTool.execute(json!({}), &ctx).await.is_err());
        assert!(ReadDocumentTool
            .execute(json!({ "path": " " }), &ctx)
            .await
            .is_err());
        assert!(FindDocumentTool.execute(json!({}), &ctx).await.is_err());
        assert!(SearchMultipleTool
            .execute(json!({ "queries": [] }), &ctx)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn half_open_page_ranges_are_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let err = ReadDocumentTool
            .execute(json!({ "path": "docs/a.md", "first_page": 1 }), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("given together"));
    }
}
