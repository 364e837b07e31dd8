/// 模拟文档库
///
/// 内置一组示例作业，用于离线演示和测试
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::clients::DocumentStore;
use crate::error::{ApiError, AppResult};
use crate::models::{DriveFile, DriveFileList};
use crate::utils::{is_supported_file_type, is_valid_folder_id};

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const PDF: &str = "application/pdf";

/// 模拟文档库
#[derive(Debug, Clone)]
pub struct MockDriveStore {
    files: Vec<DriveFile>,
    list_latency: Duration,
    download_latency: Duration,
}

impl Default for MockDriveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriveStore {
    pub fn new() -> Self {
        let samples = [
            ("mock-a1b2c3d4e5f6g7h8i9", "學生A_期末報告.docx", "145678", DOCX, "2024-08-15T10:30:00.000Z"),
            ("mock-b2c3d4e5f6g7h8i9j0", "學生B_期末報告.pdf", "234567", PDF, "2024-08-14T14:20:00.000Z"),
            ("mock-c3d4e5f6g7h8i9j0k1", "學生C_期末報告.docx", "189012", DOCX, "2024-08-13T09:15:00.000Z"),
            ("mock-d4e5f6g7h8i9j0k1l2", "學生D_期末報告.pdf", "201345", PDF, "2024-08-12T16:45:00.000Z"),
            ("mock-e5f6g7h8i9j0k1l2m3", "學生E_期末報告.docx", "167890", DOCX, "2024-08-11T11:30:00.000Z"),
            ("mock-f6g7h8i9j0k1l2m3n4", "學生F_image.jpg", "567890", "image/jpeg", "2024-08-10T13:20:00.000Z"),
        ];

        let files = samples
            .into_iter()
            .map(|(id, name, size, mime, modified)| {
                let mut file = DriveFile::new(id, name, mime);
                file.size = Some(size.to_string());
                file.modified_time = Some(modified.to_string());
                file
            })
            .collect();

        Self {
            files,
            list_latency: Duration::from_millis(500),
            download_latency: Duration::from_millis(1000),
        }
    }

    /// 设置模拟延迟（测试中通常设为零）
    pub fn with_latency(mut self, list: Duration, download: Duration) -> Self {
        self.list_latency = list;
        self.download_latency = download;
        self
    }

    /// 全部示例文件，包括不支持评分的类型
    pub fn files(&self) -> &[DriveFile] {
        &self.files
    }
}

#[async_trait]
impl DocumentStore for MockDriveStore {
    async fn list_files(
        &self,
        folder_id: &str,
        _page_token: Option<&str>,
    ) -> AppResult<DriveFileList> {
        if !is_valid_folder_id(folder_id) {
            return Err(ApiError::InvalidFolderId(folder_id.to_string()).into());
        }

        tokio::time::sleep(self.list_latency).await;

        let files: Vec<DriveFile> = self
            .files
            .iter()
            .filter(|f| is_supported_file_type(&f.mime_type))
            .cloned()
            .collect();
        debug!("📂 模拟文件夹返回 {} 个文件", files.len());

        Ok(DriveFileList {
            files,
            next_page_token: None,
            incomplete_search: Some(false),
        })
    }

    async fn download_file(&self, file_id: &str, _mime_type: Option<&str>) -> AppResult<Vec<u8>> {
        let file = self
            .files
            .iter()
            .find(|f| f.id == file_id)
            .ok_or_else(|| ApiError::NotFound(file_id.to_string()))?;

        tokio::time::sleep(self.download_latency).await;

        let content = format!(
            "这是文件 {} 的模拟内容。

期末报告摘要：
本报告探讨了人工智能在教育领域的应用，包括：
1. 个性化学习系统的发展
2. 自动评分技术的实现
3. 学习分析与预测模型

结论：
AI 技术能够显著提升教育效率，但仍需要人工监督和调整。",
            file.name
        );
        Ok(content.into_bytes())
    }
}
