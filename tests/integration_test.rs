use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hw_grader::clients::{DocumentStore, GradingWorkspace};
use hw_grader::config::BatchConfig;
use hw_grader::error::{ApiError, AppError, AppResult, SchedulerError};
use hw_grader::logger;
use hw_grader::models::{
    DriveFile, DriveFileList, ProcessingProgress, ProcessingStatus, UploadAck, CANCELLED_BY_USER,
};
use hw_grader::orchestrator::{BatchScheduler, ProgressListener};
use hw_grader::services::NO_RESULTS_TO_EXPORT;
use tokio::sync::Semaphore;

const GOOD_REPLY: &str = r#"评分结果：{"score": 88, "comments": "论述清楚", "rubric": [{"key": "structure", "weight": 0.3, "subScore": 90}]}"#;

// ========== 测试桩 ==========

/// 下载可被信号量挡住，用来把文件停在 running 状态
#[derive(Default)]
struct ScriptedStore {
    hold: Option<Arc<Semaphore>>,
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn list_files(&self, _: &str, _: Option<&str>) -> AppResult<DriveFileList> {
        Ok(DriveFileList::default())
    }

    async fn download_file(&self, file_id: &str, _: Option<&str>) -> AppResult<Vec<u8>> {
        if let Some(hold) = &self.hold {
            let _permit = hold.acquire().await.expect("信号量不应关闭");
        }
        Ok(format!("作业 {}", file_id).into_bytes())
    }
}

#[derive(Clone, Copy)]
enum Step {
    Reply(&'static str),
    /// 正常评分，但先等待一段时间
    ReplyAfter(Duration),
    Fail,
    Hang,
    Panic,
}

/// 按文件名预设每次评分的结果，用完后返回正常评分
#[derive(Default)]
struct ScriptedGrader {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, u32>>,
    prompts: Mutex<Vec<Option<String>>>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedGrader {
    fn script(self, file_name: &str, steps: &[Step]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(file_name.to_string(), steps.iter().copied().collect());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self, file_name: &str) -> u32 {
        self.calls.lock().unwrap().get(file_name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl GradingWorkspace for ScriptedGrader {
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        _: &str,
        _: &str,
        workspace_slug: &str,
    ) -> AppResult<UploadAck> {
        assert!(!bytes.is_empty());
        assert_eq!(workspace_slug, "grading-ws");
        Ok(UploadAck {
            success: true,
            ..Default::default()
        })
    }

    async fn grade_assignment(
        &self,
        _: &str,
        file_name: &str,
        custom_prompt: Option<&str>,
    ) -> AppResult<String> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(file_name.to_string())
            .or_default() += 1;
        self.prompts
            .lock()
            .unwrap()
            .push(custom_prompt.map(str::to_string));
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(file_name)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Reply(GOOD_REPLY));

        match step {
            Step::Hang => std::future::pending().await,
            Step::Panic => panic!("模拟评分服务崩溃"),
            Step::Fail => Err(ApiError::GradingRejected {
                message: "模拟网络错误".to_string(),
            }
            .into()),
            Step::ReplyAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(GOOD_REPLY.to_string())
            }
            Step::Reply(text) => {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(text.to_string())
            }
        }
    }

    async fn verify_auth(&self) -> bool {
        true
    }
}

// ========== 辅助函数 ==========

fn files(names: &[&str]) -> Vec<DriveFile> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| DriveFile::new(format!("file-{}", i), *name, "application/pdf"))
        .collect()
}

fn config(max_concurrency: usize, retry_attempts: u32) -> BatchConfig {
    let mut config = BatchConfig::new("grading-ws");
    config.max_concurrency = max_concurrency;
    config.retry_attempts = retry_attempts;
    config
}

type Snapshots = Arc<Mutex<Vec<ProcessingProgress>>>;

fn recorder() -> (Snapshots, Arc<dyn ProgressListener>) {
    let snapshots: Snapshots = Arc::default();
    let sink = Arc::clone(&snapshots);
    let listener: Arc<dyn ProgressListener> = Arc::new(move |progress: ProcessingProgress| {
        sink.lock().unwrap().push(progress);
    });
    (snapshots, listener)
}

fn assert_consistent(progress: &ProcessingProgress, max_concurrency: usize, retry_attempts: u32) {
    assert!(progress.completed + progress.failed <= progress.total);
    assert!(progress.in_progress <= max_concurrency);
    let running = progress
        .results
        .values()
        .filter(|r| r.status == ProcessingStatus::Running)
        .count();
    assert_eq!(running, progress.in_progress);
    for record in progress.results.values() {
        assert!(!(record.result.is_some() && record.error.is_some()));
        assert!(record.attempts <= retry_attempts);
        assert_eq!(record.result.is_some(), record.status == ProcessingStatus::Done);
    }
}

// ========== 场景 ==========

#[tokio::test(start_paused = true)]
async fn test_retry_then_succeed() {
    logger::init();

    let grader = Arc::new(ScriptedGrader::default().script("a.pdf", &[Step::Fail, Step::Fail]));
    let (snapshots, listener) = recorder();
    let scheduler = BatchScheduler::with_listener(
        config(1, 3),
        Arc::new(ScriptedStore::default()),
        grader.clone(),
        Some(listener),
    )
    .unwrap();

    let progress = scheduler.process_files(files(&["a.pdf"])).await.unwrap();

    let record = progress.record("file-0").unwrap();
    assert_eq!(record.status, ProcessingStatus::Done);
    assert_eq!(record.attempts, 3);
    assert!(record.error.is_none());
    assert_eq!(record.result.as_ref().unwrap().score, 88.0);
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.failed, 0);
    assert_eq!(grader.calls("a.pdf"), 3);

    // 初始 + 三次开始 + 成功，中间失败不通知
    let snapshots = snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 5);
    assert!(snapshots.iter().all(|p| p.failed == 0));
    for snapshot in snapshots.iter() {
        assert_consistent(snapshot, 1, 3);
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_with_timeout() {
    let grader = ScriptedGrader::default().script("slow.docx", &[Step::Hang, Step::Hang]);
    let mut config = config(1, 2);
    config.timeout_ms = 50;
    let (snapshots, listener) = recorder();
    let scheduler = BatchScheduler::with_listener(
        config,
        Arc::new(ScriptedStore::default()),
        Arc::new(grader),
        Some(listener),
    )
    .unwrap();

    let progress = scheduler.process_files(files(&["slow.docx"])).await.unwrap();

    let record = progress.record("file-0").unwrap();
    assert_eq!(record.status, ProcessingStatus::Timeout);
    assert_eq!(record.attempts, 2);
    assert!(record.error.as_deref().unwrap().contains("超时"));
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.completed, 0);
    assert_eq!(scheduler.export_to_csv().unwrap(), NO_RESULTS_TO_EXPORT);

    // 初始 + 两次开始 + 最终失败
    assert_eq!(snapshots.lock().unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_response_mentioning_timeout_is_not_a_timeout() {
    let grader = ScriptedGrader::default().script(
        "a.pdf",
        &[Step::Reply("the grader hit a timeout and gave up")],
    );
    let scheduler = BatchScheduler::new(
        config(1, 1),
        Arc::new(ScriptedStore::default()),
        Arc::new(grader),
    )
    .unwrap();

    let progress = scheduler.process_files(files(&["a.pdf"])).await.unwrap();
    assert_eq!(
        progress.record("file-0").unwrap().status,
        ProcessingStatus::Failed
    );
}

#[tokio::test]
async fn test_cancel_while_first_file_running() {
    let hold = Arc::new(Semaphore::new(0));
    let store = ScriptedStore {
        hold: Some(Arc::clone(&hold)),
    };
    let scheduler = BatchScheduler::new(
        config(1, 3),
        Arc::new(store),
        Arc::new(ScriptedGrader::default()),
    )
    .unwrap();

    let mut rx = scheduler.subscribe();
    let runner = scheduler.clone();
    let batch = tokio::spawn(async move {
        runner
            .process_files(files(&["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf"]))
            .await
    });

    rx.wait_for(|p| p.in_progress == 1).await.unwrap();

    assert_eq!(scheduler.cancel_processing(), 4);
    let after_first_cancel = scheduler.progress();
    assert_eq!(scheduler.cancel_processing(), 0);
    assert_eq!(scheduler.progress(), after_first_cancel);

    hold.add_permits(1);
    let progress = batch.await.unwrap().unwrap();

    assert_eq!(progress.completed, 1);
    assert_eq!(progress.failed, 4);
    assert_eq!(
        progress.record("file-0").unwrap().status,
        ProcessingStatus::Done
    );
    let cancelled: Vec<_> = progress
        .results
        .values()
        .filter(|r| r.error.as_deref() == Some(CANCELLED_BY_USER))
        .collect();
    assert_eq!(cancelled.len(), 4);
    assert!(cancelled
        .iter()
        .all(|r| r.status == ProcessingStatus::Failed && r.attempts == 0));
    assert_eq!(scheduler.summary().cancelled, 4);
}

#[tokio::test(start_paused = true)]
async fn test_retry_failed_subset() {
    let grader = Arc::new(
        ScriptedGrader::default()
            .script("a.pdf", &[Step::Fail])
            .script("b.pdf", &[Step::Reply("没有 JSON")]),
    );
    let (snapshots, listener) = recorder();
    let scheduler = BatchScheduler::with_listener(
        config(2, 1),
        Arc::new(ScriptedStore::default()),
        grader.clone(),
        Some(listener),
    )
    .unwrap();

    let first = scheduler
        .process_files(files(&["a.pdf", "b.pdf", "c.pdf"]))
        .await
        .unwrap();
    assert_eq!(first.failed, 2);
    assert_eq!(first.completed, 1);
    let done_before = first.record("file-2").unwrap().clone();

    let second = scheduler.retry_failed_files().await.unwrap();
    assert_eq!(second.failed, 0);
    assert_eq!(second.completed, 3);
    assert_eq!(second.total, 3);
    for id in ["file-0", "file-1"] {
        let record = second.record(id).unwrap();
        assert_eq!(record.status, ProcessingStatus::Done);
        assert_eq!(record.attempts, 1);
    }
    assert_eq!(second.record("file-2").unwrap(), &done_before);
    assert_eq!(grader.calls("c.pdf"), 1);
    assert_eq!(grader.calls("a.pdf"), 2);

    // 没有失败时重试是空操作
    let third = scheduler.retry_failed_files().await.unwrap();
    assert_eq!(third, second);

    for snapshot in snapshots.lock().unwrap().iter() {
        assert_consistent(snapshot, 2, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_ceiling() {
    let grader = Arc::new(ScriptedGrader::default().with_delay(Duration::from_millis(100)));
    let (snapshots, listener) = recorder();
    let scheduler = BatchScheduler::with_listener(
        config(2, 1),
        Arc::new(ScriptedStore::default()),
        grader.clone(),
        Some(listener),
    )
    .unwrap();

    let names = ["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf", "6.pdf"];
    let progress = scheduler.process_files(files(&names)).await.unwrap();

    assert_eq!(progress.completed, 6);
    assert_eq!(grader.peak.load(Ordering::SeqCst), 2);
    let snapshots = snapshots.lock().unwrap();
    assert!(snapshots.iter().any(|p| p.in_progress == 2));
    for snapshot in snapshots.iter() {
        assert_consistent(snapshot, 2, 1);
    }

    let csv = scheduler.export_to_csv().unwrap();
    assert_eq!(csv.lines().count(), 7);
}

#[tokio::test]
async fn test_empty_batch() {
    let scheduler = BatchScheduler::new(
        config(2, 3),
        Arc::new(ScriptedStore::default()),
        Arc::new(ScriptedGrader::default()),
    )
    .unwrap();

    let progress = scheduler.process_files(Vec::new()).await.unwrap();
    assert_eq!(progress.total, 0);
    assert!(progress.is_settled());
    assert_eq!(scheduler.export_to_csv().unwrap(), NO_RESULTS_TO_EXPORT);
    assert_eq!(scheduler.summary().percent_complete, 100.0);
}

#[tokio::test]
async fn test_duplicate_ids_processed_once() {
    let grader = Arc::new(ScriptedGrader::default());
    let scheduler = BatchScheduler::new(
        config(2, 1),
        Arc::new(ScriptedStore::default()),
        grader.clone(),
    )
    .unwrap();

    let file = DriveFile::new("same-id", "a.pdf", "application/pdf");
    let progress = scheduler
        .process_files(vec![file.clone(), file])
        .await
        .unwrap();
    assert_eq!(progress.total, 1);
    assert_eq!(progress.completed, 1);
    assert_eq!(grader.calls("a.pdf"), 1);
}

#[tokio::test]
async fn test_second_batch_rejected_while_running() {
    let hold = Arc::new(Semaphore::new(0));
    let store = ScriptedStore {
        hold: Some(Arc::clone(&hold)),
    };
    let scheduler = BatchScheduler::new(
        config(1, 1),
        Arc::new(store),
        Arc::new(ScriptedGrader::default()),
    )
    .unwrap();

    let mut rx = scheduler.subscribe();
    let runner = scheduler.clone();
    let batch = tokio::spawn(async move { runner.process_files(files(&["a.pdf"])).await });
    rx.wait_for(|p| p.in_progress == 1).await.unwrap();

    let err = scheduler
        .process_files(files(&["b.pdf"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Scheduler(SchedulerError::BatchInProgress { pending: 1 })
    ));

    hold.add_permits(1);
    let progress = batch.await.unwrap().unwrap();
    assert_eq!(progress.completed, 1);

    // 上一批结束后可以开始新批次
    hold.add_permits(1);
    let next = scheduler.process_files(files(&["b.pdf"])).await.unwrap();
    assert_eq!(next.total, 1);
    assert_eq!(next.completed, 1);
}

#[tokio::test]
async fn test_panicking_task_is_recorded_as_failure() {
    let grader = ScriptedGrader::default().script("boom.pdf", &[Step::Panic]);
    let scheduler = BatchScheduler::new(
        config(2, 3),
        Arc::new(ScriptedStore::default()),
        Arc::new(grader),
    )
    .unwrap();

    let progress = scheduler
        .process_files(files(&["ok.pdf", "boom.pdf"]))
        .await
        .unwrap();

    assert_eq!(progress.completed, 1);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.in_progress, 0);
    let record = progress.record("file-1").unwrap();
    assert_eq!(record.status, ProcessingStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("任务异常退出"));
}

#[tokio::test]
async fn test_custom_prompt_passed_through() {
    let grader = Arc::new(ScriptedGrader::default());
    let mut config = config(1, 1);
    config.custom_prompt = Some("只评价引用格式".to_string());
    let scheduler = BatchScheduler::new(
        config,
        Arc::new(ScriptedStore::default()),
        grader.clone(),
    )
    .unwrap();

    scheduler.process_files(files(&["a.pdf"])).await.unwrap();
    assert_eq!(
        grader.prompts.lock().unwrap().as_slice(),
        &[Some("只评价引用格式".to_string())]
    );
}

#[test]
fn test_invalid_config_rejected() {
    for broken in [config(0, 3), config(2, 0)] {
        let result = BatchScheduler::new(
            broken,
            Arc::new(ScriptedStore::default()),
            Arc::new(ScriptedGrader::default()),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    let mut no_timeout = config(2, 3);
    no_timeout.timeout_ms = 0;
    assert!(BatchScheduler::new(
        no_timeout,
        Arc::new(ScriptedStore::default()),
        Arc::new(ScriptedGrader::default()),
    )
    .is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listener_ends_on_final_snapshot() {
    logger::init();

    let grader = Arc::new(
        ScriptedGrader::default().script("b.pdf", &[Step::ReplyAfter(Duration::from_millis(50))]),
    );
    let seen: Snapshots = Arc::default();
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn ProgressListener> = Arc::new(move |progress: ProcessingProgress| {
        // 在中间快照上卡住回调，让 b 的完成通知在别的线程上先到
        if progress.completed == 1 && progress.in_progress == 1 {
            std::thread::sleep(Duration::from_millis(300));
        }
        sink.lock().unwrap().push(progress);
    });
    let scheduler = BatchScheduler::with_listener(
        config(2, 1),
        Arc::new(ScriptedStore::default()),
        grader,
        Some(listener),
    )
    .unwrap();

    let progress = scheduler.process_files(files(&["a.pdf", "b.pdf"])).await.unwrap();
    assert_eq!(progress.completed, 2);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&progress));
    // 送达顺序与变更顺序一致，完成数不会倒退
    assert!(seen.windows(2).all(|w| w[0].completed <= w[1].completed));
}
