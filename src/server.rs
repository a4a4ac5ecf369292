//! HTTP surface: REST tool routes plus the MCP endpoint.
//!
//! One [`ToolRegistry`] backs everything. The built-ins and any compiled
//! extensions resolve through the same lookup, execute through the same
//! [`ToolContext`], and are reachable both as plain JSON routes and over
//! MCP streamable HTTP at `/mcp`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `*`    | `/mcp` | MCP Streamable HTTP endpoint (JSON-RPC) |
//!
//! # Error Contract
//!
//! Failures always serialize the same envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "parameter 'query' is required" } }
//! ```
//!
//! with `bad_request` (400), `not_found` (404), `forbidden` (403),
//! `timeout` (408) and `tool_error` (500) as the code vocabulary.
//! Containment refusals and policy denials deliberately share the
//! `forbidden` code so callers need not distinguish how a path was
//! blocked.
//!
//! CORS is wide open (any origin, method, header); the server carries no
//! credentials and AI-tool clients call it cross-origin.
//!
//! An MCP client entry for Cursor and friends:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "docfort": {
//!       "command": "docfort",
//!       "args": ["--config", "/path/to/docfort.toml", "serve", "mcp"]
//!     }
//!   }
//! }
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::errors::{AccessError, ExecutionError, FilterError, PathError, SearchError};
use crate::knowledge::KnowledgeBase;
use crate::mcp::McpBridge;
use crate::tools::{Tool, ToolContext, ToolRegistry};

/// What every handler gets to see: the facade and the built-in registry.
/// Extension tools travel separately in the state tuple so built-ins
/// always win name lookups.
#[derive(Clone)]
struct AppState {
    knowledge: Arc<KnowledgeBase>,
    tools: Arc<ToolRegistry>,
}

/// Serves the configured knowledge root until the process dies. Entry
/// point of `docfort serve mcp`; binds to `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    run_server_with_extensions(config, Arc::new(ToolRegistry::new())).await
}

/// Same as [`run_server`] but with extension tools registered next to the
/// built-ins, for custom binaries embedding the crate. Extensions show up
/// on `/tools/list` and over MCP like any built-in, just without the
/// `builtin` flag.
///
/// ```rust,no_run
/// use docfort::server::run_server_with_extensions;
/// use docfort::tools::ToolRegistry;
/// use std::sync::Arc;
///
/// # async fn example(config: &docfort::config::Config) -> anyhow::Result<()> {
/// let mut tools = ToolRegistry::new();
/// // tools.register(Box::new(CollectionStatsTool));
/// run_server_with_extensions(config, Arc::new(tools)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_server_with_extensions(
    config: &Config,
    extra_tools: Arc<ToolRegistry>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let knowledge = Arc::new(KnowledgeBase::new(config)?);

    let state = AppState {
        knowledge: knowledge.clone(),
        tools: Arc::new(ToolRegistry::with_builtins()),
    };

    println!(
        "Serving {} tools over {}:",
        state.tools.len() + extra_tools.len(),
        knowledge.root().display()
    );
    for t in state.tools.tools() {
        println!("  POST /tools/{:<18} {} [builtin]", t.name(), t.description());
    }
    for t in extra_tools.tools() {
        println!("  POST /tools/{:<18} {} [custom]", t.name(), t.description());
    }

    let bridge = McpBridge::new(knowledge, state.tools.clone(), extra_tools.clone());
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state((state, extra_tools));

    println!("Listening on http://{} (MCP endpoint at /mcp)", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error envelope ============

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorInfo,
}

/// The wire-visible half of a failure: a fixed-vocabulary code plus a
/// message safe to show to an agent.
#[derive(Serialize)]
struct ErrorInfo {
    code: String,
    message: String,
}

/// A failed request, carrying the status it renders with.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorInfo {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

/// Containment and policy refusals.
fn forbidden(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::FORBIDDEN, "forbidden", message)
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", message)
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", message)
}

/// Maps a tool failure onto the error contract. Access failures carry
/// their own taxonomy and classify by variant; parameter complaints from
/// tools arrive as plain `anyhow` errors, so those fall back to message
/// patterns.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    if let Some(access) = err.downcast_ref::<AccessError>() {
        let msg = format!("{}: {}", tool_name, access);
        return match access {
            AccessError::Path(PathError::NotFound(_)) => not_found(msg),
            AccessError::Path(_) => forbidden(msg),
            AccessError::Filter(FilterError::FilterDenied(_)) => forbidden(msg),
            AccessError::Filter(FilterError::UnsupportedFormat(_)) => bad_request(msg),
            AccessError::Execution(ExecutionError::Timeout { .. }) => timeout_error(msg),
            AccessError::Search(SearchError::QuerySyntax(_)) => bad_request(msg),
            _ => tool_error(msg),
        };
    }

    let msg = err.to_string();
    if msg.contains("required") || msg.contains("must") || msg.contains("at most") {
        bad_request(format!("{}: {}", tool_name, msg))
    } else if msg.contains("timed out") {
        timeout_error(format!("{}: {}", tool_name, msg))
    } else {
        tool_error(format!("{}: {}", tool_name, msg))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthBody {
    status: String,
    version: String,
}

/// Liveness probe, also what the test harnesses poll while the listener
/// comes up.
async fn handle_health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

/// One tool as agents discover it.
#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    builtin: bool,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolList {
    tools: Vec<ToolInfo>,
}

fn describe(tool: &dyn Tool, builtin: bool) -> ToolInfo {
    ToolInfo {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        builtin,
        parameters: tool.parameters_schema(),
    }
}

/// Advertises every registered tool with its parameter schema. Extension
/// tools report `builtin: false` regardless of what their trait impl
/// claims.
async fn handle_list_tools(
    State((state, extras)): State<(AppState, Arc<ToolRegistry>)>,
) -> Json<ToolList> {
    let mut tools: Vec<ToolInfo> = state
        .tools
        .tools()
        .iter()
        .map(|t| describe(t.as_ref(), t.is_builtin()))
        .collect();
    tools.extend(extras.tools().iter().map(|t| describe(t.as_ref(), false)));

    Json(ToolList { tools })
}

// ============ POST /tools/{name} ============

/// Dispatches one tool call. Built-ins resolve before extensions, so an
/// extension can never shadow `read_document` and friends. The result
/// value arrives wrapped as `{ "result": ... }`; failures go through
/// [`classify_tool_error`].
async fn handle_tool_call(
    State((state, extras)): State<(AppState, Arc<ToolRegistry>)>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .or_else(|| extras.find(&name))
        .ok_or_else(|| not_found(format!("unknown tool: {}", name)))?;

    let ctx = ToolContext::new(state.knowledge.clone());
    let result = tool
        .execute(params, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
