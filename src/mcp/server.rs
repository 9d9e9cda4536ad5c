//! MCP stdio server implementation

use super::tools::{get_tool_definitions, handle_tool_call};
use super::types::{ErrorCode, McpMessage, McpNotification, McpRequest, McpResponse};
use crate::engine::Engine;
use crate::error::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use tracing::{debug, error, info, warn};

/// MCP Server implementation
pub struct McpServer {
    engine: Engine,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Run the MCP server loop over stdio. The engine is closed when stdin ends.
    pub async fn run(&self) -> Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.serve(stdin.lock(), stdout.lock()).await
    }

    /// Serve line-delimited JSON-RPC from `reader` until it ends
    pub async fn serve<R: BufRead, W: Write>(&self, reader: R, mut writer: W) -> Result<()> {
        info!("MCP server starting");

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!("Failed to read line: {}", e);
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            let message: McpMessage = match serde_json::from_str(&line) {
                Ok(m) => m,
                Err(e) => {
                    error!("Failed to parse message: {}", e);
                    let response = McpResponse::error_with_code(
                        None,
                        ErrorCode::ParseError,
                        format!("Parse error: {}", e),
                    );
                    writeln!(writer, "{}", serde_json::to_string(&response)?)?;
                    writer.flush()?;
                    continue;
                }
            };

            match message {
                McpMessage::Request(req) => {
                    let response = self.handle_request(req).await;
                    let response_str = serde_json::to_string(&response)?;
                    debug!("Sending: {}", response_str);
                    writeln!(writer, "{}", response_str)?;
                    writer.flush()?;
                }
                McpMessage::Notification(notif) => {
                    self.handle_notification(notif);
                }
                McpMessage::Response(_) => {
                    warn!("Unexpected response message received");
                }
            }
        }

        info!("MCP server shutting down");
        self.engine.close().await;
        Ok(())
    }

    async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let id = request.id.clone();

        if request.jsonrpc != "2.0" {
            return McpResponse::error_with_code(
                id,
                ErrorCode::InvalidRequest,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => McpResponse::success(id, json!({ "tools": get_tool_definitions() })),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => McpResponse::success(id, json!({ "resources": [] })),
            "prompts/list" => McpResponse::success(id, json!({ "prompts": [] })),
            _ => McpResponse::error_with_code(
                id,
                ErrorCode::MethodNotFound,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    fn handle_notification(&self, notification: McpNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => info!("Request cancelled"),
            _ => debug!("Unknown notification: {}", notification.method),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> McpResponse {
        McpResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": { "listChanged": false },
                    "resources": { "subscribe": false, "listChanged": false },
                    "prompts": { "listChanged": false }
                },
                "serverInfo": {
                    "name": "chunkvault",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> McpResponse {
        let params = match params {
            Some(p) => p,
            None => return McpResponse::error_with_code(id, ErrorCode::InvalidParams, "Missing params"),
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n.to_string(),
            None => {
                return McpResponse::error_with_code(id, ErrorCode::InvalidParams, "Missing tool name")
            }
        };

        let arguments: HashMap<String, Value> = params
            .get("arguments")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        debug!("Calling tool: {} with args: {:?}", name, arguments);

        let result = handle_tool_call(&name, &arguments, &self.engine).await;

        McpResponse::success(
            id,
            json!({
                "content": result.content,
                "isError": result.is_error.unwrap_or(false)
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NewDocument;
    use crate::test_utils::test_config;
    use std::io::Cursor;
    use tempfile::TempDir;

    async fn lexical_engine(tmp: &TempDir) -> Engine {
        let config = test_config(tmp.path(), "http://127.0.0.1:9", &[]);
        let engine = Engine::open(&config).await.unwrap();
        engine
            .create_document(NewDocument {
                id: "doc-1".to_string(),
                title: "Animals".to_string(),
                texts: vec!["the quick fox".to_string(), "the lazy dog".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        engine
    }

    async fn exchange(server: &McpServer, requests: &[Value]) -> Vec<Value> {
        let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
        let mut output = Vec::new();
        server
            .serve(Cursor::new(input.into_bytes()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn tool_text(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap_or(Value::String(text.to_string()))
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let tmp = TempDir::new().unwrap();
        let server = McpServer::new(lexical_engine(&tmp).await);

        let responses = exchange(
            &server,
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                json!({"jsonrpc": "2.0", "id": 3, "method": "bogus"}),
            ],
        )
        .await;

        // The notification gets no reply
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "chunkvault");
        let names: Vec<&str> = responses[1]["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["search_documents", "list_models", "get_document"]);
        assert_eq!(responses[2]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_tool_calls() {
        let tmp = TempDir::new().unwrap();
        let server = McpServer::new(lexical_engine(&tmp).await);

        let responses = exchange(
            &server,
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                       "params": {"name": "search_documents",
                                  "arguments": {"model": "bm25", "query": "fox", "n": 5}}}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                       "params": {"name": "list_models", "arguments": {}}}),
                json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                       "params": {"name": "get_document", "arguments": {"document_id": "doc-1"}}}),
                json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                       "params": {"name": "get_document", "arguments": {"document_id": "nope"}}}),
                json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
                       "params": {"name": "search_documents",
                                  "arguments": {"model": "missing", "query": "fox"}}}),
            ],
        )
        .await;

        let search = tool_text(&responses[0]);
        assert_eq!(search["results"].as_array().unwrap().len(), 1);
        assert_eq!(search["results"][0]["document_id"], "doc-1");

        assert_eq!(tool_text(&responses[1])["models"], json!(["bm25"]));

        let doc = tool_text(&responses[2]);
        assert_eq!(doc["document"]["title"], "Animals");
        assert_eq!(doc["document"]["chunks"].as_array().unwrap().len(), 2);

        assert_eq!(responses[3]["result"]["isError"], true);
        assert_eq!(responses[4]["result"]["isError"], true);
    }

    #[tokio::test]
    async fn test_parse_error_and_close_on_eof() {
        let tmp = TempDir::new().unwrap();
        let server = McpServer::new(lexical_engine(&tmp).await);

        let mut output = Vec::new();
        server
            .serve(Cursor::new(b"{not json\n".to_vec()), &mut output)
            .await
            .unwrap();
        let response: Value =
            serde_json::from_str(String::from_utf8(output).unwrap().trim()).unwrap();
        assert_eq!(response["error"]["code"], -32700);

        // End of input closed the engine
        let err = server
            .engine
            .create_document(NewDocument {
                id: "late".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::ShuttingDown));
    }
}
