//! 单个文件的处理记录
//!
//! 状态机：
//!
//! ```text
//! queued → running → done
//!             ↓
//!        failed | timeout ──(下一次尝试)──→ running
//!
//! failed | timeout ──(retry_failed_files)──→ queued
//! queued ──(cancel_processing)──→ failed
//! ```
//!
//! `result` 与 `error` 互斥，所有转换都经由本模块的方法完成。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::grade::GradeResult;

/// 用户取消时写入记录的错误信息
pub const CANCELLED_BY_USER: &str = "用户已取消";

/// 处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Queued,
    Running,
    Done,
    Failed,
    Timeout,
}

impl ProcessingStatus {
    /// done / failed / timeout
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Timeout)
    }

    /// failed / timeout
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// 单个文件的处理记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProcessingResult {
    pub file_id: String,
    pub file_name: String,
    pub status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GradeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 已开始的尝试次数
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl FileProcessingResult {
    pub fn queued(file_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            status: ProcessingStatus::Queued,
            result: None,
            error: None,
            attempts: 0,
            start_time: None,
            end_time: None,
        }
    }

    /// 开始第 `attempt` 次尝试
    ///
    /// 上一次尝试留下的错误信息保留到本次有结果为止
    pub fn begin_attempt(&mut self, attempt: u32, now: DateTime<Utc>) {
        self.status = ProcessingStatus::Running;
        self.attempts = attempt;
        self.result = None;
        self.start_time = Some(now);
        self.end_time = None;
    }

    pub fn complete(&mut self, grade: GradeResult, now: DateTime<Utc>) {
        self.status = ProcessingStatus::Done;
        self.result = Some(grade);
        self.error = None;
        self.end_time = Some(now);
    }

    /// 记录一次失败，`timed_out` 决定状态是 timeout 还是 failed
    pub fn fail(&mut self, message: impl Into<String>, timed_out: bool, now: DateTime<Utc>) {
        self.status = if timed_out {
            ProcessingStatus::Timeout
        } else {
            ProcessingStatus::Failed
        };
        self.result = None;
        self.error = Some(message.into());
        self.end_time = Some(now);
    }

    /// 排队中的记录直接置为 failed，其他状态不受影响
    ///
    /// # 返回
    /// 是否发生了转换
    pub fn cancel(&mut self) -> bool {
        if self.status != ProcessingStatus::Queued {
            return false;
        }
        self.status = ProcessingStatus::Failed;
        self.error = Some(CANCELLED_BY_USER.to_string());
        true
    }

    /// 重新排队，清空尝试次数、错误和时间戳
    pub fn reset_for_retry(&mut self) {
        self.status = ProcessingStatus::Queued;
        self.attempts = 0;
        self.result = None;
        self.error = None;
        self.start_time = None;
        self.end_time = None;
    }

    pub fn was_cancelled(&self) -> bool {
        self.status == ProcessingStatus::Failed && self.error.as_deref() == Some(CANCELLED_BY_USER)
    }

    /// 最近一次尝试的耗时（秒，四舍五入），缺少时间戳时为 0
    pub fn elapsed_secs(&self) -> i64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => {
                let ms = (end - start).num_milliseconds().max(0);
                (ms + 500) / 1000
            }
            _ => 0,
        }
    }
}
