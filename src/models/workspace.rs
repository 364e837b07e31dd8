//! AnythingLLM 工作区与对话的请求 / 响应结构

use serde::{Deserialize, Serialize};

/// 工作区描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_updated_at: Option<String>,
    #[serde(default)]
    pub open_ai_temp: Option<f64>,
    #[serde(default)]
    pub open_ai_history: Option<u32>,
    #[serde(default)]
    pub open_ai_prompt: Option<String>,
}

/// 对话模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Chat,
    Query,
}

/// 创建 / 更新工作区的配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_ai_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_ai_history: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_ai_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_mode: Option<ChatMode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceList {
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceEnvelope {
    pub workspace: Workspace,
    #[serde(default)]
    pub message: Option<String>,
}

/// 对话请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub mode: ChatMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub reset: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSource {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub chunk: String,
}

/// 对话响应
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub response_type: String,
    #[serde(default)]
    pub text_response: Option<String>,
    #[serde(default)]
    pub sources: Vec<ChatSource>,
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// 文档上传回执
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub documents: Option<serde_json::Value>,
}

/// 服务健康状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub version: Option<String>,
}
