//! Bridge from the tool registry and knowledge facade to MCP.
//!
//! Mounted as a Streamable HTTP service under `/mcp`, speaking JSON-RPC
//! to Cursor, Claude and other MCP clients. Three protocol surfaces:
//! the registered tools (built-in and extension alike), read-only
//! `knowledge://` resources for indexes and document metadata, and a
//! `research` prompt that walks a client through the search workflow.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};

use crate::knowledge::KnowledgeBase;
use crate::resources::{self, ResourceRequest};
use crate::tools::{ToolContext, ToolRegistry};

const RESEARCH_PROMPT: &str = "research";

/// Per-session MCP handler. Cloned for every session the transport
/// opens; the `Arc` fields keep all sessions on one shared tool set and
/// knowledge base.
#[derive(Clone)]
pub struct McpBridge {
    knowledge: Arc<KnowledgeBase>,
    tools: Arc<ToolRegistry>,
    extra_tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        tools: Arc<ToolRegistry>,
        extra_tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            knowledge,
            tools,
            extra_tools,
        }
    }

    fn find_tool(&self, name: &str) -> Option<&dyn crate::tools::Tool> {
        self.tools
            .find(name)
            .or_else(|| self.extra_tools.find(name))
    }

    /// One registered tool as its MCP descriptor. Everything here is
    /// read-only, and the annotation says so.
    fn to_mcp_tool(tool: &dyn crate::tools::Tool) -> Tool {
        let schema_value = tool.parameters_schema();
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> = match schema_value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    fn to_mcp_resource(uri: &str, name: &str, description: &str) -> Resource {
        let mut raw = RawResource::new(uri, name.to_string());
        raw.description = Some(description.to_string());
        raw.mime_type = Some("application/json".to_string());
        raw.no_annotation()
    }

    fn research_prompt() -> Prompt {
        Prompt {
            name: RESEARCH_PROMPT.to_string(),
            title: None,
            description: Some(
                "Research a topic across the knowledge base using search and targeted reads"
                    .to_string(),
            ),
            arguments: Some(vec![PromptArgument {
                name: "topic".to_string(),
                title: None,
                description: Some("Topic or question to research".to_string()),
                required: Some(true),
            }]),
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "docfort".to_string(),
                title: Some("Docfort".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Docfort — sandboxed read-only access to a document knowledge base. \
                 Use search_documents for Boolean full-text search, read_document to \
                 retrieve content (with page ranges for paginated formats), and \
                 list_collections / find_document to navigate. Indexes are also \
                 available as resources: knowledge://index, knowledge://{path}/index \
                 and knowledge://{path}/info."
                    .to_string(),
            ),
        }
    }

    // ============ Tools ============

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let mut tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        tools.extend(
            self.extra_tools
                .tools()
                .iter()
                .map(|t| Self::to_mcp_tool(t.as_ref())),
        );
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.find_tool(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.find_tool(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("unknown tool: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let ctx = ToolContext::new(self.knowledge.clone());
        match tool.execute(params, &ctx).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    // ============ Resources ============

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let mut listed: Vec<Resource> = vec![Self::to_mcp_resource(
            resources::ROOT_INDEX_URI,
            "knowledge-index",
            "Top-level collections and documents in the knowledge base",
        )];
        if let Ok(listing) = self.knowledge.list_collections("") {
            for name in &listing.collections {
                listed.push(Self::to_mcp_resource(
                    &resources::collection_index_uri(name),
                    &format!("{name}-index"),
                    &format!("Contents of the '{name}' collection"),
                ));
            }
        }
        std::future::ready(Ok(ListResourcesResult::with_all_items(listed)))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let parsed: ResourceRequest = resources::parse_uri(&request.uri).ok_or_else(|| {
            McpError::new(
                ErrorCode::RESOURCE_NOT_FOUND,
                format!("unrecognized resource uri: {}", request.uri),
                None,
            )
        })?;

        let value = resources::read(&self.knowledge, &parsed)
            .await
            .map_err(|e| {
                McpError::new(
                    ErrorCode::RESOURCE_NOT_FOUND,
                    format!("resource '{}': {}", request.uri, e),
                    None,
                )
            })?;

        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }

    // ============ Prompts ============

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListPromptsResult::with_all_items(vec![
            Self::research_prompt(),
        ])))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        if request.name != RESEARCH_PROMPT {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("unknown prompt: {}", request.name),
                None,
            ));
        }

        let topic = request
            .arguments
            .as_ref()
            .and_then(|args| args.get("topic"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                McpError::new(
                    ErrorCode::INVALID_PARAMS,
                    "prompt 'research' requires a 'topic' argument",
                    None,
                )
            })?
            .to_string();

        let text = format!(
            "You have read-only access to a document knowledge base through the \
             docfort tools.\n\nResearch the following topic: {topic}\n\n\
             1. Call list_collections to see how the knowledge base is organized.\n\
             2. Use search_documents to locate relevant passages. Queries are \
             Boolean: terms are ANDed, with OR, NOT and \"quoted phrases\" \
             supported. Scope to a collection when one is clearly relevant, and \
             use search_multiple to fan out several related queries in one call.\n\
             3. Read the most promising documents with read_document. Long \
             documents are truncated, so request specific page ranges for \
             paginated formats.\n\
             4. Base every statement on what the documents actually say, citing \
             the document path and line numbers from the search results."
        );

        Ok(GetPromptResult {
            description: Some(format!("Research workflow for: {topic}")),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
        })
    }
}
