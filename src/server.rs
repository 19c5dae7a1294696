//! MCP framing glue.
//!
//! This is the one place that knows about rmcp: it advertises the tool
//! surface and forwards calls into [`crate::tools::dispatch`]. All tool
//! semantics live in the core, keeping this handler free of logic.

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::{RequestContext, RoleServer},
    ErrorData as McpError, ServerHandler,
};
use serde_json::Value;
use std::sync::Arc;

use crate::ble::session::Session;
use crate::tools;

/// The MCP server fronting one Thingy:52 session.
#[derive(Clone)]
pub struct ThingyServer {
    session: Arc<Session>,
}

impl ThingyServer {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

fn schema_object(value: Value) -> Arc<serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    }
}

impl ServerHandler for ThingyServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Bridge to a Nordic Thingy:52 sensor kit over Bluetooth LE. \
                 Scan for devices, connect to one, then read its environment \
                 and motion sensors or drive its LED and speaker."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = tools::tool_definitions()
            .into_iter()
            .map(|def| Tool::new(def.name, def.description, schema_object(def.input_schema)))
            .collect();

        Ok(ListToolsResult {
            tools,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(Value::Object)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        match tools::dispatch(&self.session, &request.name, args).await {
            Ok(value) => Ok(CallToolResult::success(vec![Content::text(
                value.to_string(),
            )])),
            Err(e) => {
                tracing::warn!(tool = %request.name, "tool failed: {}", e);
                Ok(CallToolResult::error(vec![Content::text(
                    e.to_value().to_string(),
                )]))
            }
        }
    }
}
