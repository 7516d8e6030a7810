//! Protocol Type Definitions
//!
//! This module gathers the typed payloads carried inside JSON-RPC messages,
//! organized into submodules for initialization, tools, resources and prompts.

pub mod initialize;
pub mod prompts;
pub mod resources;
pub mod tools;

use serde::{ Deserialize, Serialize };

use crate::messages::RequestId;

// Re-export common types from each module
pub use initialize::{
    ClientCapabilities,
    Implementation,
    InitializeRequestParams,
    InitializeResult,
    LATEST_PROTOCOL_VERSION,
    PromptsCapability,
    ResourcesCapability,
    SUPPORTED_PROTOCOL_VERSIONS,
    ServerCapabilities,
    ToolsCapability,
    is_supported_version,
    negotiate_version,
};
pub use prompts::{
    GetPromptParams,
    GetPromptResult,
    ListPromptsResult,
    Prompt,
    PromptArgument,
    PromptMessage,
    Role,
};
pub use resources::{
    ListResourceTemplatesResult,
    ListResourcesResult,
    ReadResourceParams,
    ReadResourceResult,
    Resource,
    ResourceContents,
    ResourceTemplate,
};
pub use tools::{
    CallToolParams,
    CallToolResult,
    Content,
    ListToolsResult,
    Tool,
    ToolError,
    ToolOutput,
};

/// Parameters of the `notifications/cancelled` notification
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    /// Id of the request to abandon
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
