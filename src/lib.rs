//! # HW Grader
//!
//! 批量作业评分：从 Google Drive 列出学生作业，上传到 AnythingLLM 工作区评分，
//! 汇总进度并导出 CSV。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 外部系统，调度器只依赖其中的 trait
//! - `DocumentStore` - 列出 / 下载文件（`DriveClient`、`MockDriveStore`）
//! - `GradingWorkspace` - 上传 / 评分 / 认证（`AnythingLlmClient`）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `prompt` - 评分提示词
//! - `grade_parser` - 从模型回复中提取并校验评分
//! - `csv_export` - 成绩导出
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件的一次尝试"
//! - `GradingCtx` - 上下文封装（文件 + 尝试序号）
//! - `GradingFlow` - 下载 → 上传 → 评分 → 解析，共享一个时间预算
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量调度：并发上限、重试退避、取消、进度
//! - `orchestrator/admission` - 并发准入闸门
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod logger;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use clients::{DocumentStore, GradingWorkspace};
pub use config::{BatchConfig, Config};
pub use error::{AppError, AppResult};
pub use models::{
    DriveFile, FileProcessingResult, GradeResult, ProcessingProgress, ProcessingStatus,
};
pub use orchestrator::{BatchScheduler, ProgressListener};
pub use workflow::{GradingCtx, GradingFlow};
