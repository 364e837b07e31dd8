//! 错误类型
//!
//! 按关注点分组：外部 API、评分响应解析、配置、调度器、导出。
//! 单个文件的处理错误永远不会从调度器抛出，只会写入该文件的处理记录。

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 外部 API 调用错误（文档库 / 评分工作区）
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 评分响应解析或校验失败
    #[error("评分解析错误: {0}")]
    Parse(#[from] GradeParseError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 调度器错误
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),
    /// 导出错误
    #[error("导出错误: {0}")]
    Export(#[from] ExportError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

impl AppError {
    /// 是否为请求超时（结构化信号，不做字符串匹配）
    pub fn is_timeout(&self) -> bool {
        match self {
            AppError::Api(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// 创建API请求失败错误
    pub fn api_request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        })
    }
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// API 返回非 2xx 状态
    #[error("API返回错误响应 ({endpoint}): status={status}, body={body}")]
    BadResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// 响应 JSON 解析失败
    #[error("JSON解析失败 ({endpoint}): {source}")]
    JsonParseFailed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    /// 评分服务在响应中显式返回了错误
    #[error("评分失败: {message}")]
    GradingRejected { message: String },
    /// 未设置访问令牌
    #[error("未设置访问令牌")]
    MissingAccessToken,
    /// 文件夹ID格式不正确
    #[error("无效的文件夹ID: {0}")]
    InvalidFolderId(String),
    /// 不支持导出的 Google Workspace 类型
    #[error("不支持的 Google Workspace 文件类型: {0}")]
    UnsupportedMimeType(String),
    /// 文件不存在
    #[error("文件不存在: {0}")]
    NotFound(String),
}

impl ApiError {
    /// 底层 HTTP 请求是否因超时而失败
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::RequestFailed { source, .. } if source.is_timeout())
    }
}

/// 评分响应解析 / 校验错误
///
/// 任何一种都算作本次尝试失败，按重试策略处理
#[derive(Debug, Error)]
pub enum GradeParseError {
    /// 文本中没有 `{...}` 片段
    #[error("响应中未找到 JSON 对象")]
    NoJsonObject,
    /// 找到了片段但不是合法 JSON
    #[error("JSON 解析失败: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// JSON 结构与评分结果不符（字段缺失或类型错误）
    #[error("评分结构不符: {0}")]
    Schema(#[source] serde_json::Error),
    /// 总分不在 [0, 100]
    #[error("分数 {score} 超出范围 [0, 100]")]
    ScoreOutOfRange { score: f64 },
    /// 评分项权重不在 [0, 1]
    #[error("评分项 {key} 的权重 {weight} 超出范围 [0, 1]")]
    WeightOutOfRange { key: String, weight: f64 },
    /// 评分项分数不在 [0, 100]
    #[error("评分项 {key} 的分数 {sub_score} 超出范围 [0, 100]")]
    SubScoreOutOfRange { key: String, sub_score: f64 },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// 调度器错误
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// 上一批尚未结束
    #[error("已有批次正在处理中 ({pending} 个文件未结束)")]
    BatchInProgress { pending: usize },
}

/// 导出错误
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV写入失败: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV缓冲区转换失败: {0}")]
    Buffer(String),
    #[error("CSV不是合法 UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
