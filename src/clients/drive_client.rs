/// Google Drive v3 客户端
///
/// 只读：列出文件夹内容、下载或导出文件
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::clients::DocumentStore;
use crate::error::{ApiError, AppError, AppResult};
use crate::models::DriveFileList;
use crate::utils::is_valid_folder_id;

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";
const LIST_FIELDS: &str = "files(id,name,size,mimeType,parents,webViewLink,webContentLink,modifiedTime),nextPageToken,incompleteSearch";
const PAGE_SIZE: &str = "100";

/// Google 在线文档导出时使用的格式
pub fn export_format(google_mime_type: &str) -> Option<&'static str> {
    match google_mime_type {
        "application/vnd.google-apps.document" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        "application/vnd.google-apps.spreadsheet" => {
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        }
        "application/vnd.google-apps.presentation" => {
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
        }
        "application/vnd.google-apps.drawing" => Some("application/pdf"),
        _ => None,
    }
}

/// Drive 客户端
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: Client,
    base_url: String,
    access_token: Option<String>,
}

impl DriveClient {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: DRIVE_API_BASE.to_string(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// 指向其他地址（代理或本地测试服务）
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = Some(token.into());
    }

    fn authorized(&self, request: RequestBuilder) -> AppResult<RequestBuilder> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(ApiError::MissingAccessToken)?;
        Ok(request.bearer_auth(token))
    }

    async fn fetch_bytes(&self, endpoint: &str, request: RequestBuilder) -> AppResult<Vec<u8>> {
        let response = self
            .authorized(request)?
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::BadResponse {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentStore for DriveClient {
    async fn list_files(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> AppResult<DriveFileList> {
        if !is_valid_folder_id(folder_id) {
            return Err(ApiError::InvalidFolderId(folder_id.to_string()).into());
        }

        let endpoint = "/files";
        let query = format!("'{}' in parents and trashed=false", folder_id);
        let mut params = vec![
            ("q", query.as_str()),
            ("fields", LIST_FIELDS),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
            ("pageSize", PAGE_SIZE),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let request = self
            .http
            .get(format!("{}{}", self.base_url, endpoint))
            .query(&params);
        let body = self.fetch_bytes(endpoint, request).await?;

        let list: DriveFileList =
            serde_json::from_slice(&body).map_err(|source| ApiError::JsonParseFailed {
                endpoint: endpoint.to_string(),
                source,
            })?;
        debug!("📂 文件夹 {} 本页 {} 个文件", folder_id, list.files.len());
        Ok(list)
    }

    async fn download_file(&self, file_id: &str, mime_type: Option<&str>) -> AppResult<Vec<u8>> {
        match mime_type.filter(|m| m.starts_with(GOOGLE_APPS_PREFIX)) {
            // 在线文档需要导出
            Some(google_type) => {
                let target = export_format(google_type)
                    .ok_or_else(|| ApiError::UnsupportedMimeType(google_type.to_string()))?;
                let endpoint = format!("/files/{}/export", file_id);
                let request = self
                    .http
                    .get(format!("{}{}", self.base_url, endpoint))
                    .query(&[("mimeType", target)]);
                self.fetch_bytes(&endpoint, request).await
            }
            None => {
                let endpoint = format!("/files/{}", file_id);
                let request = self
                    .http
                    .get(format!("{}{}", self.base_url, endpoint))
                    .query(&[("alt", "media")]);
                self.fetch_bytes(&endpoint, request).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOLDER: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz012345";

    #[test]
    fn test_export_format() {
        assert_eq!(
            export_format("application/vnd.google-apps.drawing"),
            Some("application/pdf")
        );
        assert_eq!(export_format("application/vnd.google-apps.form"), None);
    }

    #[tokio::test]
    async fn test_invalid_folder_is_rejected_before_request() {
        let client = DriveClient::new(Some("token".to_string()));
        let err = client.list_files("short", None).await.unwrap_err();
        assert!(matches!(err, AppError::Api(ApiError::InvalidFolderId(_))));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let client = DriveClient::new(Some("  ".to_string()));
        let err = client.list_files(FOLDER, None).await.unwrap_err();
        assert!(matches!(err, AppError::Api(ApiError::MissingAccessToken)));
    }

    #[tokio::test]
    async fn test_unsupported_google_type() {
        let client = DriveClient::new(Some("token".to_string()));
        let err = client
            .download_file("abc", Some("application/vnd.google-apps.form"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Api(ApiError::UnsupportedMimeType(_))));
    }
}
