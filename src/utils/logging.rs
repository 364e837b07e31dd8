/// 日志工具模块
///
/// 提供批次日志的格式化和输出辅助函数
use anyhow::Result;
use tracing::info;

use crate::models::{ProcessingProgress, ProgressSummary};

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub async fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n作业批改日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    tokio::fs::write(log_file_path, log_header).await?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrency`: 最大并发数
/// - `retry_attempts`: 每个文件的最大尝试次数
pub fn log_startup(max_concurrency: usize, retry_attempts: u32) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量作业评分模式");
    info!("📊 最大并发数: {}", max_concurrency);
    info!("🔁 每个文件最多尝试: {} 次", retry_attempts);
    info!("{}", "=".repeat(60));
}

/// 记录文件加载信息
pub fn log_files_loaded(total: usize, skipped: usize) {
    info!("✓ 找到 {} 个待评分的文件", total);
    if skipped > 0 {
        info!("⏭️ 跳过 {} 个不支持的文件", skipped);
    }
}

/// 记录一行进度
pub fn log_progress(progress: &ProcessingProgress) {
    info!(
        "📈 进度: 完成 {} | 失败 {} | 处理中 {} | 共 {}",
        progress.completed, progress.failed, progress.in_progress, progress.total
    );
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &ProgressSummary, csv_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.completed, summary.total);
    info!(
        "❌ 失败: {} (超时 {}, 取消 {})",
        summary.failed, summary.timed_out, summary.cancelled
    );
    if let Some(avg) = summary.average_score {
        info!("🎯 平均分: {:.1}", avg);
    }
    info!("{}", "=".repeat(60));
    info!("\n成绩已导出至: {}", csv_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
