//! 外部系统客户端
//!
//! 调度器只依赖这里的两个 trait，具体实现可替换（真实 API / 模拟实现 / 测试桩）。

pub mod anything_llm_client;
pub mod drive_client;
pub mod mock_drive;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{DriveFile, DriveFileList, UploadAck};

pub use anything_llm_client::AnythingLlmClient;
pub use drive_client::DriveClient;
pub use mock_drive::MockDriveStore;

/// 文档库能力：列出文件夹、下载文件
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_files(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> AppResult<DriveFileList>;

    async fn download_file(&self, file_id: &str, mime_type: Option<&str>) -> AppResult<Vec<u8>>;

    /// 跟随分页令牌列出全部文件
    async fn list_all_files(&self, folder_id: &str) -> AppResult<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_files(folder_id, page_token.as_deref()).await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }
}

/// 评分工作区能力：上传文档、对话评分、认证检查
#[async_trait]
pub trait GradingWorkspace: Send + Sync {
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        workspace_slug: &str,
    ) -> AppResult<UploadAck>;

    /// 返回模型的原始文本回复，解析由调用方完成
    async fn grade_assignment(
        &self,
        workspace_slug: &str,
        file_name: &str,
        custom_prompt: Option<&str>,
    ) -> AppResult<String>;

    async fn verify_auth(&self) -> bool;
}
