//! 文件评分上下文
//!
//! 封装"我正在处理哪个文件的第几次尝试"这一信息

use std::fmt::Display;

/// 单次尝试的上下文
#[derive(Debug, Clone)]
pub struct GradingCtx {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: String,
    /// 当前尝试序号（从1开始）
    pub attempt: u32,
    pub max_attempts: u32,
}

impl GradingCtx {
    pub fn new(
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            attempt,
            max_attempts,
        }
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

impl Display for GradingCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[文件 {} #{}/{}]",
            self.file_name, self.attempt, self.max_attempts
        )
    }
}
