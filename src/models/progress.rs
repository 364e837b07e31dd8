//! 批次进度聚合
//!
//! 计数器与记录表的所有变更都集中在这里，调度器持锁后调用。
//! 对外只交出 [`ProcessingProgress`] 的克隆快照。

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::drive_file::DriveFile;
use crate::models::grade::GradeResult;
use crate::models::record::{FileProcessingResult, ProcessingStatus};

/// 一个批次的进度
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingProgress {
    /// 批次开始时的文件数
    pub total: usize,
    pub completed: usize,
    /// 已放弃的文件数（含取消）
    pub failed: usize,
    /// 当前处于 running 的文件数
    pub in_progress: usize,
    /// 文件ID → 处理记录
    pub results: HashMap<String, FileProcessingResult>,
}

/// 可序列化的进度摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    pub in_progress: usize,
    pub queued: usize,
    pub percent_complete: f64,
    pub average_score: Option<f64>,
}

impl ProcessingProgress {
    /// 为每个文件创建 queued 记录，重复的文件ID只保留第一个
    pub fn new(files: &[DriveFile]) -> Self {
        let mut results = HashMap::with_capacity(files.len());
        for file in files {
            results
                .entry(file.id.clone())
                .or_insert_with(|| FileProcessingResult::queued(&file.id, &file.name));
        }

        Self {
            total: results.len(),
            results,
            ..Default::default()
        }
    }

    pub fn record(&self, file_id: &str) -> Option<&FileProcessingResult> {
        self.results.get(file_id)
    }

    /// 第 `attempt` 次尝试开始
    ///
    /// 第一次尝试要求记录仍在排队（被取消的记录不会再启动），
    /// 之后的尝试要求记录停在上一次的失败状态。
    ///
    /// # 返回
    /// 是否真正开始
    pub fn start_attempt(&mut self, file_id: &str, attempt: u32, now: DateTime<Utc>) -> bool {
        let Some(record) = self.results.get_mut(file_id) else {
            return false;
        };

        let ready = if attempt <= 1 {
            record.status == ProcessingStatus::Queued
        } else {
            record.status.is_failure()
        };
        if !ready {
            return false;
        }

        record.begin_attempt(attempt, now);
        self.in_progress += 1;
        true
    }

    pub fn finish_success(&mut self, file_id: &str, grade: GradeResult, now: DateTime<Utc>) {
        if let Some(record) = self.results.get_mut(file_id) {
            record.complete(grade, now);
            self.in_progress = self.in_progress.saturating_sub(1);
            self.completed += 1;
        }
    }

    /// 记录一次失败的尝试，只有最后一次尝试计入 `failed`
    pub fn finish_failure(
        &mut self,
        file_id: &str,
        message: String,
        timed_out: bool,
        final_attempt: bool,
        now: DateTime<Utc>,
    ) {
        if let Some(record) = self.results.get_mut(file_id) {
            record.fail(message, timed_out, now);
            self.in_progress = self.in_progress.saturating_sub(1);
            if final_attempt {
                self.failed += 1;
            }
        }
    }

    /// 把所有排队中的记录标为取消
    ///
    /// # 返回
    /// 被取消的记录数
    pub fn cancel_queued(&mut self) -> usize {
        let cancelled = self
            .results
            .values_mut()
            .map(|record| record.cancel())
            .filter(|&cancelled| cancelled)
            .count();
        self.failed += cancelled;
        cancelled
    }

    /// 重置所有已结束的失败记录，`busy` 中的文件（仍在重试循环里）跳过
    ///
    /// # 返回
    /// 重新排队的文件ID（按ID排序）
    pub fn reset_failures(&mut self, busy: &HashSet<String>) -> Vec<String> {
        let mut reset = Vec::new();
        for (file_id, record) in self.results.iter_mut() {
            if record.status.is_failure() && !busy.contains(file_id) {
                record.reset_for_retry();
                reset.push(file_id.clone());
            }
        }
        self.failed = self.failed.saturating_sub(reset.len());
        reset.sort();
        reset
    }

    /// 任务异常退出时补记结果
    ///
    /// running 或 queued 的记录按最终失败处理，其余状态已记账，不再改动
    pub fn abandon(&mut self, file_id: &str, message: String, now: DateTime<Utc>) {
        let Some(record) = self.results.get_mut(file_id) else {
            return;
        };
        match record.status {
            ProcessingStatus::Running => {
                self.in_progress = self.in_progress.saturating_sub(1);
            }
            ProcessingStatus::Queued => {}
            _ => return,
        }
        record.fail(message, false, now);
        self.failed += 1;
    }

    /// 所有记录都已结束且没有运行中的尝试
    pub fn is_settled(&self) -> bool {
        self.in_progress == 0 && self.results.values().all(|r| r.status.is_terminal())
    }

    pub fn failed_files(&self) -> Vec<&FileProcessingResult> {
        self.results
            .values()
            .filter(|r| r.status.is_failure())
            .collect()
    }

    pub fn successful_results(&self) -> Vec<&FileProcessingResult> {
        self.results
            .values()
            .filter(|r| r.status == ProcessingStatus::Done && r.result.is_some())
            .collect()
    }

    pub fn summary(&self) -> ProgressSummary {
        let count = |status: ProcessingStatus| {
            self.results
                .values()
                .filter(|r| r.status == status)
                .count()
        };

        let scores: Vec<f64> = self
            .results
            .values()
            .filter_map(|r| r.result.as_ref().map(|g| g.score))
            .collect();
        let average_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };

        let percent_complete = if self.total == 0 {
            100.0
        } else {
            (self.completed + self.failed) as f64 * 100.0 / self.total as f64
        };

        ProgressSummary {
            total: self.total,
            completed: self.completed,
            failed: self.failed,
            cancelled: self.results.values().filter(|r| r.was_cancelled()).count(),
            timed_out: count(ProcessingStatus::Timeout),
            in_progress: self.in_progress,
            queued: count(ProcessingStatus::Queued),
            percent_complete,
            average_score,
        }
    }
}
