/// AnythingLLM API 客户端
///
/// 封装工作区管理、文档上传和评分对话的 HTTP 调用
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{multipart, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::GradingWorkspace;
use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};
use crate::models::workspace::{WorkspaceEnvelope, WorkspaceList};
use crate::models::{
    ChatMode, ChatRequest, ChatResponse, HealthStatus, UploadAck, Workspace, WorkspaceConfig,
};
use crate::services::prompt::build_grading_message;

const CLIENT_USER_AGENT: &str = "HWToLLM-Client/1.0";

/// AnythingLLM 客户端
#[derive(Debug, Clone)]
pub struct AnythingLlmClient {
    http: Client,
    base_url: String,
}

impl AnythingLlmClient {
    /// 创建客户端，`base_url` 形如 `http://localhost:3001/api`
    pub fn new(base_url: &str, api_key: &str) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| AppError::Other(format!("API Key 含有非法字符: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        // 经 ngrok 转发时跳过浏览器警告页
        headers.insert(
            "ngrok-skip-browser-warning",
            HeaderValue::from_static("true"),
        );

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::api_request_failed("client", e))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(&config.anything_llm_base_url, &config.anything_llm_api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// 发送请求并把 2xx 响应体解析为 `T`
    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> AppResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        if !status.is_success() {
            return Err(ApiError::BadResponse {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        serde_json::from_str(&body).map_err(|source| {
            ApiError::JsonParseFailed {
                endpoint: endpoint.to_string(),
                source,
            }
            .into()
        })
    }

    /// 检查 API Key 是否有效
    pub async fn verify_auth(&self) -> bool {
        let endpoint = "/v1/auth";
        match self
            .send_json::<Value>(endpoint, self.http.get(self.url(endpoint)))
            .await
        {
            Ok(body) => body
                .get("authenticated")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Err(e) => {
                warn!("认证检查失败: {}", e);
                false
            }
        }
    }

    pub async fn list_workspaces(&self) -> AppResult<Vec<Workspace>> {
        let endpoint = "/v1/workspaces";
        let list: WorkspaceList = self
            .send_json(endpoint, self.http.get(self.url(endpoint)))
            .await?;
        Ok(list.workspaces)
    }

    pub async fn get_workspace(&self, slug: &str) -> AppResult<Workspace> {
        let endpoint = format!("/v1/workspace/{}", slug);
        let body: Value = self
            .send_json(&endpoint, self.http.get(self.url(&endpoint)))
            .await?;

        // 该接口有的版本返回对象，有的返回单元素数组
        let workspace = match body.get("workspace") {
            Some(Value::Array(items)) => items.first().cloned(),
            Some(item) => Some(item.clone()),
            None => None,
        }
        .ok_or_else(|| ApiError::NotFound(format!("工作区 {}", slug)))?;

        serde_json::from_value(workspace).map_err(|source| {
            ApiError::JsonParseFailed { endpoint, source }.into()
        })
    }

    pub async fn create_workspace(&self, config: &WorkspaceConfig) -> AppResult<Workspace> {
        let endpoint = "/v1/workspace/new";
        let envelope: WorkspaceEnvelope = self
            .send_json(endpoint, self.http.post(self.url(endpoint)).json(config))
            .await?;
        info!(
            "✅ 已创建工作区: {} ({})",
            envelope.workspace.name, envelope.workspace.slug
        );
        Ok(envelope.workspace)
    }

    /// 以评分场景的默认参数创建工作区
    pub async fn create_grading_workspace(
        &self,
        name: &str,
        temperature: f64,
        max_history: u32,
        custom_prompt: Option<&str>,
    ) -> AppResult<Workspace> {
        let config = WorkspaceConfig {
            name: name.to_string(),
            open_ai_temp: Some(temperature),
            open_ai_history: Some(max_history),
            open_ai_prompt: custom_prompt.map(str::to_string),
            similarity_threshold: Some(0.7),
            top_n: Some(4),
            chat_mode: Some(ChatMode::Chat),
        };
        self.create_workspace(&config).await
    }

    pub async fn update_workspace(
        &self,
        slug: &str,
        config: &WorkspaceConfig,
    ) -> AppResult<Workspace> {
        let endpoint = format!("/v1/workspace/{}/update", slug);
        let envelope: WorkspaceEnvelope = self
            .send_json(&endpoint, self.http.post(self.url(&endpoint)).json(config))
            .await?;
        Ok(envelope.workspace)
    }

    pub async fn delete_workspace(&self, slug: &str) -> AppResult<()> {
        let endpoint = format!("/v1/workspace/{}", slug);
        let response = self
            .http
            .delete(self.url(&endpoint))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::BadResponse {
                endpoint,
                status: status.as_u16(),
                body,
            }
            .into());
        }
        info!("🗑️ 已删除工作区: {}", slug);
        Ok(())
    }

    /// 上传文档并加入指定工作区
    pub async fn upload_document(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        workspace_slug: &str,
    ) -> AppResult<UploadAck> {
        let endpoint = "/v1/document/upload";
        let size = bytes.len();

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("addToWorkspaces", workspace_slug.to_string());

        debug!("上传文档 {} ({} 字节) → {}", file_name, size, workspace_slug);

        let ack: UploadAck = self
            .send_json(endpoint, self.http.post(self.url(endpoint)).multipart(form))
            .await?;

        if !ack.success {
            return Err(ApiError::GradingRejected {
                message: ack
                    .error
                    .unwrap_or_else(|| format!("文档 {} 上传失败", file_name)),
            }
            .into());
        }
        Ok(ack)
    }

    /// 在工作区中发起评分对话，返回模型原始回复
    pub async fn grade_assignment(
        &self,
        workspace_slug: &str,
        file_name: &str,
        custom_prompt: Option<&str>,
    ) -> AppResult<String> {
        let endpoint = format!("/v1/workspace/{}/chat", workspace_slug);
        let request = ChatRequest {
            message: build_grading_message(file_name, custom_prompt),
            mode: ChatMode::Chat,
            session_id: Some(format!(
                "grading-{}-{}",
                file_name,
                chrono::Utc::now().timestamp_millis()
            )),
            reset: true,
        };

        let response: ChatResponse = self
            .send_json(&endpoint, self.http.post(self.url(&endpoint)).json(&request))
            .await?;

        if let Some(message) = response.error.filter(|m| !m.is_empty()) {
            return Err(ApiError::GradingRejected { message }.into());
        }

        response.text_response.ok_or_else(|| {
            ApiError::GradingRejected {
                message: "评分响应中没有文本内容".to_string(),
            }
            .into()
        })
    }

    /// 服务健康检查，请求失败视为不健康
    pub async fn health_check(&self) -> HealthStatus {
        let endpoint = "/v1/system";
        match self
            .send_json::<Value>(endpoint, self.http.get(self.url(endpoint)))
            .await
        {
            Ok(body) => HealthStatus {
                healthy: true,
                version: body
                    .pointer("/settings/version")
                    .or_else(|| body.get("version"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            Err(e) => {
                warn!("健康检查失败: {}", e);
                HealthStatus {
                    healthy: false,
                    version: None,
                }
            }
        }
    }
}

#[async_trait]
impl GradingWorkspace for AnythingLlmClient {
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        workspace_slug: &str,
    ) -> AppResult<UploadAck> {
        AnythingLlmClient::upload_document(self, bytes, file_name, mime_type, workspace_slug).await
    }

    async fn grade_assignment(
        &self,
        workspace_slug: &str,
        file_name: &str,
        custom_prompt: Option<&str>,
    ) -> AppResult<String> {
        AnythingLlmClient::grade_assignment(self, workspace_slug, file_name, custom_prompt).await
    }

    async fn verify_auth(&self) -> bool {
        AnythingLlmClient::verify_auth(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let client = AnythingLlmClient::new("http://localhost:3001/api/", "key").unwrap();
        assert_eq!(client.base_url(), "http://localhost:3001/api");
        assert_eq!(
            client.url("/v1/auth"),
            "http://localhost:3001/api/v1/auth"
        );
    }

    #[test]
    fn test_invalid_api_key_is_rejected() {
        assert!(AnythingLlmClient::new("http://localhost", "bad\nkey").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unhealthy() {
        // 端口 1 上没有服务
        let client = AnythingLlmClient::new("http://127.0.0.1:1/api", "key").unwrap();
        let status = client.health_check().await;
        assert!(!status.healthy);
        assert!(!client.verify_auth().await);
    }
}
