//! 文件评分流程 - 流程层
//!
//! 核心职责：定义"一个文件的一次尝试"的完整处理流程
//!
//! 流程顺序：
//! 1. 从文档库下载
//! 2. 上传到评分工作区
//! 3. 发起评分对话
//! 4. 解析并校验评分结果
//!
//! 四个阶段共享一个时间预算。超时后整个流程 future 被丢弃，
//! 正在进行的 HTTP 请求随之中止。

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::clients::{DocumentStore, GradingWorkspace};
use crate::config::BatchConfig;
use crate::error::{AppError, AppResult};
use crate::models::{DriveFile, GradeResult};
use crate::services::parse_grade_response;
use crate::utils::truncate_text;
use crate::workflow::grading_ctx::GradingCtx;

/// 流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Download,
    Upload,
    Grade,
    Parse,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Download => "下载",
            PipelineStage::Upload => "上传",
            PipelineStage::Grade => "评分",
            PipelineStage::Parse => "解析",
        };
        f.write_str(name)
    }
}

fn cause_suffix(cause: &Option<String>) -> String {
    cause
        .as_deref()
        .map(|c| format!(": {}", c))
        .unwrap_or_default()
}

/// 一次尝试的失败原因
#[derive(Debug, Error)]
pub enum AttemptError {
    /// 超出时间预算
    ///
    /// 预算耗尽时恰好返回的错误也归为超时，原始错误保留在 `cause`
    #[error("{stage}阶段超时 (超过 {budget_ms}ms){}", cause_suffix(.cause))]
    TimedOut {
        budget_ms: u64,
        stage: PipelineStage,
        cause: Option<String>,
    },
    /// 某个阶段失败
    #[error("{stage}失败: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: AppError,
    },
}

impl AttemptError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::TimedOut { .. })
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            AttemptError::TimedOut { stage, .. } | AttemptError::Stage { stage, .. } => *stage,
        }
    }
}

/// 文件评分流程
///
/// - 只编排单次尝试，重试和计数由调度器负责
/// - 只依赖两个客户端 trait
pub struct GradingFlow {
    store: Arc<dyn DocumentStore>,
    grader: Arc<dyn GradingWorkspace>,
    workspace_slug: String,
    custom_prompt: Option<String>,
    timeout: Duration,
}

impl GradingFlow {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        grader: Arc<dyn GradingWorkspace>,
        config: &BatchConfig,
    ) -> Self {
        Self {
            store,
            grader,
            workspace_slug: config.workspace_slug.clone(),
            custom_prompt: config.custom_prompt.clone(),
            timeout: config.timeout(),
        }
    }

    /// 在时间预算内执行一次完整尝试
    pub async fn run_attempt(
        &self,
        file: &DriveFile,
        ctx: &GradingCtx,
    ) -> Result<GradeResult, AttemptError> {
        let started = Instant::now();
        let stage = Mutex::new(PipelineStage::Download);
        let budget_ms = self.timeout.as_millis() as u64;

        let outcome = tokio::time::timeout(self.timeout, self.pipeline(file, ctx, &stage)).await;
        let stage = stage.into_inner().unwrap_or_else(PoisonError::into_inner);

        match outcome {
            Ok(Ok(grade)) => Ok(grade),
            Ok(Err(source)) if source.is_timeout() || started.elapsed() >= self.timeout => {
                Err(AttemptError::TimedOut {
                    budget_ms,
                    stage,
                    cause: Some(source.to_string()),
                })
            }
            Ok(Err(source)) => Err(AttemptError::Stage { stage, source }),
            Err(_) => Err(AttemptError::TimedOut {
                budget_ms,
                stage,
                cause: None,
            }),
        }
    }

    async fn pipeline(
        &self,
        file: &DriveFile,
        ctx: &GradingCtx,
        stage: &Mutex<PipelineStage>,
    ) -> AppResult<GradeResult> {
        let enter = |next: PipelineStage| {
            *stage.lock().unwrap_or_else(PoisonError::into_inner) = next;
        };

        // ========== 1. 下载 ==========
        enter(PipelineStage::Download);
        debug!("{} ⬇️ 正在下载...", ctx);
        let bytes = self
            .store
            .download_file(&file.id, Some(&file.mime_type))
            .await?;

        // ========== 2. 上传 ==========
        enter(PipelineStage::Upload);
        debug!("{} 📤 正在上传 {} 字节...", ctx, bytes.len());
        self.grader
            .upload_document(bytes, &file.name, &file.mime_type, &self.workspace_slug)
            .await?;

        // ========== 3. 评分 ==========
        enter(PipelineStage::Grade);
        debug!("{} 🤖 正在评分...", ctx);
        let response = self
            .grader
            .grade_assignment(
                &self.workspace_slug,
                &file.name,
                self.custom_prompt.as_deref(),
            )
            .await?;

        // ========== 4. 解析 ==========
        enter(PipelineStage::Parse);
        debug!("{} 评分回复: {}", ctx, truncate_text(&response, 120));
        let grade = parse_grade_response(&response)?;

        info!("{} ✓ 得分 {}", ctx, grade.score);
        Ok(grade)
    }
}
