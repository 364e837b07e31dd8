//! 批量评分调度器 - 编排层
//!
//! ## 职责
//!
//! 在并发上限内驱动一批相互独立的文件评分流程，负责：
//!
//! 1. **准入控制**：通过 [`AdmissionGate`] 限制同时运行的文件数，重试优先
//! 2. **重试退避**：每个文件最多尝试 `retry_attempts` 次，两次尝试之间指数退避
//! 3. **取消**：清空排队队列，运行中的文件照常完成
//! 4. **进度汇总**：所有计数和记录的变更都在同一把锁内完成，对外只交出快照
//!
//! ## 设计特点
//!
//! - 单个文件的任何错误都只写入它自己的记录，不会让整批失败
//! - 任务用 `tokio::spawn` 并发执行，`join_all` 等待全部句柄，异常退出的任务补记为失败
//! - 进度通知在状态边界触发：开始尝试、成功、最终失败、取消；中间失败不通知

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clients::{DocumentStore, GradingWorkspace};
use crate::config::BatchConfig;
use crate::error::{AppResult, SchedulerError};
use crate::models::{DriveFile, FileProcessingResult, ProcessingProgress, ProgressSummary};
use crate::orchestrator::admission::{AdmissionGate, Lane, Ticket};
use crate::orchestrator::backoff::backoff;
use crate::services::export_csv;
use crate::workflow::{GradingCtx, GradingFlow};

/// 进度通知
///
/// 每次收到的都是独立的快照，修改它不会影响调度器。
/// 回调串行调用，快照按变更顺序送达，过期的快照直接丢弃，
/// 所以最后收到的一定是最终状态。回调里可以读取调度器，
/// 但不要调用会发布进度的方法（处理、重试、取消）。
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, progress: ProcessingProgress);
}

impl<F> ProgressListener for F
where
    F: Fn(ProcessingProgress) + Send + Sync,
{
    fn on_progress(&self, progress: ProcessingProgress) {
        self(progress)
    }
}

#[derive(Default)]
struct SchedulerState {
    progress: ProcessingProgress,
    /// 文件ID → 文件句柄，重试时沿用原句柄（保留 MIME 类型）
    files: HashMap<String, DriveFile>,
    /// 已登记但任务尚未结束的文件
    in_flight: HashSet<String>,
    /// 快照序号，每次发布加一
    seq: u64,
}

struct Shared {
    config: BatchConfig,
    flow: GradingFlow,
    state: Mutex<SchedulerState>,
    gate: Arc<AdmissionGate>,
    listener: Option<Arc<dyn ProgressListener>>,
    progress_tx: watch::Sender<ProcessingProgress>,
    /// 已交给回调的最新快照序号
    delivered: Mutex<u64>,
}

/// 批量评分调度器
///
/// 可廉价克隆，克隆体共享同一批次状态（例如交给 Ctrl-C 处理任务去调用取消）
#[derive(Clone)]
pub struct BatchScheduler {
    shared: Arc<Shared>,
}

impl BatchScheduler {
    pub fn new(
        config: BatchConfig,
        store: Arc<dyn DocumentStore>,
        grader: Arc<dyn GradingWorkspace>,
    ) -> AppResult<Self> {
        Self::with_listener(config, store, grader, None)
    }

    /// 创建调度器并注册进度回调
    ///
    /// 配置不合法（并发数、超时、重试次数为 0 或工作区为空）时返回错误
    pub fn with_listener(
        config: BatchConfig,
        store: Arc<dyn DocumentStore>,
        grader: Arc<dyn GradingWorkspace>,
        listener: Option<Arc<dyn ProgressListener>>,
    ) -> AppResult<Self> {
        config.validate()?;

        let flow = GradingFlow::new(store, grader, &config);
        let gate = Arc::new(AdmissionGate::new(config.max_concurrency));
        let (progress_tx, _) = watch::channel(ProcessingProgress::default());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                flow,
                state: Mutex::new(SchedulerState::default()),
                gate,
                listener,
                progress_tx,
                delivered: Mutex::new(0),
            }),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.shared.config
    }

    /// 处理一批文件，全部结束后返回最终进度
    ///
    /// 重复的文件ID只处理一次。上一批（或重试）仍有文件未结束时拒绝。
    pub async fn process_files(&self, files: Vec<DriveFile>) -> AppResult<ProcessingProgress> {
        let shared = &self.shared;

        let ids = {
            let mut state = shared.lock_state();
            if !state.in_flight.is_empty() {
                return Err(SchedulerError::BatchInProgress {
                    pending: state.in_flight.len(),
                }
                .into());
            }

            let mut ids = Vec::with_capacity(files.len());
            let mut handles = HashMap::with_capacity(files.len());
            for file in &files {
                if !handles.contains_key(&file.id) {
                    ids.push(file.id.clone());
                    handles.insert(file.id.clone(), file.clone());
                }
            }

            state.progress = ProcessingProgress::new(&files);
            state.files = handles;
            state.in_flight.extend(ids.iter().cloned());
            ids
        };

        if ids.len() < files.len() {
            warn!("⚠️ 忽略 {} 个重复的文件", files.len() - ids.len());
        }
        info!(
            "📦 开始批次: {} 个文件, 并发 {}, 每个最多尝试 {} 次",
            ids.len(),
            shared.config.max_concurrency,
            shared.config.retry_attempts
        );
        shared.publish();

        self.run_files(ids, Lane::Fresh).await;
        Ok(self.progress())
    }

    /// 重新处理所有失败或超时的文件，以更高优先级排队
    ///
    /// 仍在重试循环中的文件不受影响。没有可重试的文件时原样返回当前进度。
    pub async fn retry_failed_files(&self) -> AppResult<ProcessingProgress> {
        let shared = &self.shared;

        let ids = {
            let mut guard = shared.lock_state();
            let state = &mut *guard;
            let ids = state.progress.reset_failures(&state.in_flight);
            state.in_flight.extend(ids.iter().cloned());
            ids
        };

        if ids.is_empty() {
            debug!("没有需要重试的文件");
            return Ok(self.progress());
        }

        info!("🔁 重试 {} 个失败的文件", ids.len());
        shared.publish();

        self.run_files(ids, Lane::Retry).await;
        Ok(self.progress())
    }

    /// 取消所有排队中的文件，运行中的文件继续完成
    ///
    /// # 返回
    /// 本次被取消的文件数（重复调用返回 0）
    pub fn cancel_processing(&self) -> usize {
        let shared = &self.shared;

        let cancelled = {
            let mut state = shared.lock_state();
            shared.gate.withdraw_all();
            state.progress.cancel_queued()
        };

        if cancelled > 0 {
            warn!("🛑 已取消 {} 个排队中的文件", cancelled);
            shared.publish();
        }
        cancelled
    }

    /// 导出成功记录为 CSV
    pub fn export_to_csv(&self) -> AppResult<String> {
        let state = self.shared.lock_state();
        Ok(export_csv(&state.progress)?)
    }

    /// 当前进度快照
    pub fn progress(&self) -> ProcessingProgress {
        self.shared.lock_state().progress.clone()
    }

    pub fn summary(&self) -> ProgressSummary {
        self.shared.lock_state().progress.summary()
    }

    /// 订阅进度快照，只保留最新一份
    pub fn subscribe(&self) -> watch::Receiver<ProcessingProgress> {
        self.shared.progress_tx.subscribe()
    }

    pub fn failed_files(&self) -> Vec<FileProcessingResult> {
        let state = self.shared.lock_state();
        state.progress.failed_files().into_iter().cloned().collect()
    }

    pub fn successful_results(&self) -> Vec<FileProcessingResult> {
        let state = self.shared.lock_state();
        state
            .progress
            .successful_results()
            .into_iter()
            .cloned()
            .collect()
    }

    /// 按登记顺序排队，并发执行，等待全部结束
    async fn run_files(&self, ids: Vec<String>, lane: Lane) {
        let tickets: Vec<(String, Ticket)> = ids
            .into_iter()
            .map(|id| {
                let ticket = self.shared.gate.enqueue(lane);
                (id, ticket)
            })
            .collect();

        let mut handles = Vec::with_capacity(tickets.len());
        for (file_id, ticket) in tickets {
            let shared = Arc::clone(&self.shared);
            let guard = InFlightGuard {
                shared: Arc::clone(&self.shared),
                file_id: file_id.clone(),
            };
            let task_id = file_id.clone();

            let handle = tokio::spawn(async move {
                let _guard = guard;
                shared.run_file(&task_id, ticket).await;
            });
            handles.push((file_id, handle));
        }

        // 全部等完再补记，单个任务异常不影响其他任务
        let joined = join_all(
            handles
                .into_iter()
                .map(|(file_id, handle)| async move { (file_id, handle.await) }),
        )
        .await;

        for (file_id, outcome) in joined {
            if let Err(e) = outcome {
                error!("[文件 {}] 任务执行失败: {}", file_id, e);
                let message = format!("任务异常退出: {}", e);
                self.shared
                    .transition(|p| p.abandon(&file_id, message, Utc::now()));
            }
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 不通知的变更
    fn mutate<R>(&self, f: impl FnOnce(&mut ProcessingProgress) -> R) -> R {
        f(&mut self.lock_state().progress)
    }

    /// 变更后发布快照
    ///
    /// watch 通道在锁内更新，保证订阅者看到的顺序与变更顺序一致；
    /// 回调在状态锁外调用，回调里可以安全地读取调度器
    fn transition<R>(&self, f: impl FnOnce(&mut ProcessingProgress) -> R) -> R {
        let (result, snapshot) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let result = f(&mut state.progress);
            (result, self.broadcast(state))
        };
        self.deliver(snapshot);
        result
    }

    fn publish(&self) {
        let snapshot = {
            let mut state = self.lock_state();
            self.broadcast(&mut state)
        };
        self.deliver(snapshot);
    }

    fn broadcast(&self, state: &mut SchedulerState) -> Option<(u64, ProcessingProgress)> {
        state.seq += 1;
        self.progress_tx.send_replace(state.progress.clone());
        self.listener
            .as_ref()
            .map(|_| (state.seq, state.progress.clone()))
    }

    /// 串行调用回调，序号不比已送达的新就丢弃
    fn deliver(&self, snapshot: Option<(u64, ProcessingProgress)>) {
        let (Some(listener), Some((seq, snapshot))) = (&self.listener, snapshot) else {
            return;
        };
        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        if seq <= *delivered {
            debug!("丢弃过期的进度快照 #{}", seq);
            return;
        }
        *delivered = seq;
        listener.on_progress(snapshot);
    }

    /// 单个文件：等待槽位 → 逐次尝试 → 记录结果
    async fn run_file(&self, file_id: &str, ticket: Ticket) {
        let Some(_permit) = ticket.admit().await else {
            debug!("[文件 {}] 排队时已被取消", file_id);
            return;
        };

        let file = {
            let state = self.lock_state();
            state.files.get(file_id).cloned()
        };
        let Some(file) = file else {
            return;
        };
        let max_attempts = self.config.retry_attempts;

        for attempt in 1..=max_attempts {
            let started = self.transition(|p| p.start_attempt(file_id, attempt, Utc::now()));
            if !started {
                // 在取得槽位前已被取消
                debug!("[文件 {}] 记录不再可运行，跳过", file.name);
                return;
            }

            let ctx = GradingCtx::new(
                &file.id,
                &file.name,
                &file.mime_type,
                attempt,
                max_attempts,
            );
            info!("{} 🚀 开始处理", ctx);

            match self.flow.run_attempt(&file, &ctx).await {
                Ok(grade) => {
                    info!("{} ✅ 评分完成: {} 分", ctx, grade.score);
                    self.transition(|p| p.finish_success(file_id, grade, Utc::now()));
                    return;
                }
                Err(err) if ctx.is_last_attempt() => {
                    error!("{} ❌ 已放弃: {}", ctx, err);
                    self.transition(|p| {
                        p.finish_failure(file_id, err.to_string(), err.is_timeout(), true, Utc::now())
                    });
                    return;
                }
                Err(err) => {
                    let delay = backoff(attempt - 1, self.config.backoff_base_ms);
                    warn!("{} ⚠️ {}，{}ms 后重试", ctx, err, delay.as_millis());
                    self.mutate(|p| {
                        p.finish_failure(file_id, err.to_string(), err.is_timeout(), false, Utc::now())
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// 任务结束（包括异常退出）时把文件移出 in_flight
struct InFlightGuard {
    shared: Arc<Shared>,
    file_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.lock_state().in_flight.remove(&self.file_id);
    }
}
