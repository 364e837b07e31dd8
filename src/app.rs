//! 命令行应用 - 顶层编排
//!
//! 初始化 → 预检 → 准备工作区 → 列出文件 → 批量评分 → 导出

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::clients::{AnythingLlmClient, DocumentStore, DriveClient, MockDriveStore};
use crate::config::Config;
use crate::models::{DriveFile, ProcessingProgress};
use crate::orchestrator::{BatchScheduler, ProgressListener};
use crate::utils::drive_url::{file_type_display, format_file_size, validate_url};
use crate::utils::logging::{
    init_log_file, log_files_loaded, log_progress, log_startup, print_final_stats,
};
use crate::utils::{extract_folder_id, is_supported_file_type};

/// 应用主结构
pub struct App {
    config: Config,
    llm: Arc<AnythingLlmClient>,
    store: Arc<dyn DocumentStore>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file).await?;

        log_startup(config.max_concurrency, config.retry_attempts);

        let llm = Arc::new(AnythingLlmClient::from_config(&config)?);

        let store: Arc<dyn DocumentStore> = if config.use_mock_drive {
            info!("🧪 使用模拟文档库");
            Arc::new(MockDriveStore::new())
        } else {
            Arc::new(DriveClient::new(config.drive_access_token.clone()))
        };

        Ok(Self { config, llm, store })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        // 预检：认证失败时不启动批次
        if !self.llm.verify_auth().await {
            bail!("AnythingLLM 认证失败，请检查 API Key 和服务地址");
        }
        info!("✓ AnythingLLM 认证成功");

        let workspace_slug = self.resolve_workspace().await?;

        let files = self.load_files().await?;
        if files.is_empty() {
            warn!("⚠️ 文件夹中没有可评分的文件，程序结束");
            return Ok(());
        }

        let batch_config = self.config.batch_config(&workspace_slug)?;
        let listener: Arc<dyn ProgressListener> =
            Arc::new(|progress: ProcessingProgress| log_progress(&progress));
        let scheduler = BatchScheduler::with_listener(
            batch_config,
            Arc::clone(&self.store),
            self.llm.clone(),
            Some(listener),
        )?;

        // Ctrl-C 只取消排队中的文件
        let canceller = scheduler.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 收到中断信号，停止派发新文件...");
                canceller.cancel_processing();
            }
        });

        let mut progress = scheduler.process_files(files).await?;

        if self.config.auto_retry_failed && progress.failed > 0 {
            info!("🔁 自动重试 {} 个失败的文件", progress.failed);
            progress = scheduler.retry_failed_files().await?;
        }
        ctrl_c.abort();

        self.write_outputs(&scheduler, &progress).await?;
        print_final_stats(&scheduler.summary(), &self.config.output_csv);

        Ok(())
    }

    /// 使用已配置的工作区，未配置时新建
    async fn resolve_workspace(&self) -> Result<String> {
        if let Some(slug) = &self.config.workspace_slug {
            info!("📁 使用工作区: {}", slug);
            return Ok(slug.clone());
        }

        info!("📁 未指定工作区，新建: {}", self.config.workspace_name);
        let workspace = self
            .llm
            .create_grading_workspace(
                &self.config.workspace_name,
                self.config.llm_temperature,
                self.config.llm_max_history,
                self.config.custom_prompt.as_deref(),
            )
            .await
            .context("创建评分工作区失败")?;
        Ok(workspace.slug)
    }

    /// 列出文件夹中的文件，只保留支持评分的类型
    async fn load_files(&self) -> Result<Vec<DriveFile>> {
        let folder = self.config.drive_folder.trim();
        if folder.starts_with("http") && !validate_url(folder) {
            warn!("⚠️ 链接看起来不是 Drive 文件夹: {}", folder);
        }
        let folder_id = extract_folder_id(&self.config.drive_folder)
            .with_context(|| format!("无法识别文件夹: {}", self.config.drive_folder))?;

        info!("\n📁 正在扫描文件夹 {} ...", folder_id);
        let all_files = self.store.list_all_files(&folder_id).await?;
        let total = all_files.len();

        let files: Vec<DriveFile> = all_files
            .into_iter()
            .filter(|f| is_supported_file_type(&f.mime_type))
            .collect();
        for file in &files {
            debug!(
                "  📄 {} [{}] {}",
                file.name,
                file_type_display(&file.mime_type),
                file.size_bytes().map(format_file_size).unwrap_or_default()
            );
        }
        log_files_loaded(files.len(), total - files.len());

        Ok(files)
    }

    async fn write_outputs(
        &self,
        scheduler: &BatchScheduler,
        progress: &ProcessingProgress,
    ) -> Result<()> {
        let csv = scheduler.export_to_csv()?;
        tokio::fs::write(&self.config.output_csv, csv)
            .await
            .with_context(|| format!("写入 {} 失败", self.config.output_csv))?;

        if let Some(path) = &self.config.output_summary_json {
            let report = json!({
                "summary": progress.summary(),
                "results": progress.results,
            });
            tokio::fs::write(path, serde_json::to_string_pretty(&report)?)
                .await
                .with_context(|| format!("写入 {} 失败", path))?;
            info!("📝 摘要已写入: {}", path);
        }

        Ok(())
    }
}
