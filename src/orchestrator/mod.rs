//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量评分调度器
//! - 为每个文件建立处理记录，汇总批次进度
//! - 逐次尝试、失败退避重试
//! - 取消排队中的文件、重试失败的文件
//! - 导出 CSV
//!
//! ### `admission` - 并发准入闸门
//! - 固定数量的执行槽位
//! - 重试优先，同类先到先得
//!
//! ### `backoff` - 重试退避
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<DriveFile>)
//!     ↓
//! workflow::GradingFlow (处理单个文件的一次尝试)
//!     ↓
//! services (能力层：prompt / parse / csv)
//!     ↓
//! clients (外部系统：DocumentStore / GradingWorkspace)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：调度器管批量和计数，流程管单次尝试
//! 2. **失败隔离**：单个文件的错误只写入它自己的记录
//! 3. **向下依赖**：编排层 → workflow → services → clients

pub mod admission;
pub mod backoff;
pub mod batch_processor;

// 重新导出主要类型
pub use admission::{AdmissionGate, Lane, SlotPermit, Ticket};
pub use backoff::{backoff, backoff_ms};
pub use batch_processor::{BatchScheduler, ProgressListener};
