use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "grader.toml";

/// 程序配置
///
/// 加载顺序：默认值 → TOML 文件 → 环境变量
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 批处理 ---
    /// 同时评分的文件数量
    pub max_concurrency: usize,
    /// 单次尝试（下载+上传+评分+解析）的时间预算
    pub timeout_ms: u64,
    /// 每个文件的最大尝试次数
    pub retry_attempts: u32,
    /// 重试退避基数
    pub backoff_base_ms: u64,
    /// 批次结束后自动重试一轮失败文件
    pub auto_retry_failed: bool,

    // --- AnythingLLM ---
    pub anything_llm_base_url: String,
    pub anything_llm_api_key: String,
    /// 已有工作区的 slug，留空则按 `workspace_name` 新建
    pub workspace_slug: Option<String>,
    pub workspace_name: String,
    pub custom_prompt: Option<String>,
    pub llm_temperature: f64,
    pub llm_max_history: u32,

    // --- Google Drive ---
    /// 文件夹链接或ID
    pub drive_folder: String,
    pub drive_access_token: Option<String>,
    /// 使用内置的模拟文档库
    pub use_mock_drive: bool,

    // --- 输出 ---
    pub output_csv: String,
    pub output_summary_json: Option<String>,
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            timeout_ms: 120_000,
            retry_attempts: 3,
            backoff_base_ms: 1000,
            auto_retry_failed: false,
            anything_llm_base_url: "http://localhost:3001/api".to_string(),
            anything_llm_api_key: String::new(),
            workspace_slug: None,
            workspace_name: "作业批改".to_string(),
            custom_prompt: None,
            llm_temperature: 0.1,
            llm_max_history: 5,
            drive_folder: String::new(),
            drive_access_token: None,
            use_mock_drive: false,
            output_csv: "grades.csv".to_string(),
            output_summary_json: None,
            output_log_file: "grading_log.txt".to_string(),
            verbose_logging: false,
        }
    }
}

/// 调度器所需的配置
#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub workspace_slug: String,
    pub custom_prompt: Option<String>,
    pub backoff_base_ms: u64,
}

impl BatchConfig {
    pub fn new(workspace_slug: impl Into<String>) -> Self {
        let default = Config::default();
        Self {
            max_concurrency: default.max_concurrency,
            timeout_ms: default.timeout_ms,
            retry_attempts: default.retry_attempts,
            workspace_slug: workspace_slug.into(),
            custom_prompt: None,
            backoff_base_ms: default.backoff_base_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 并发数、超时、重试次数必须为正，工作区不能为空
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "必须为正整数"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "必须为正整数"));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::invalid("retry_attempts", "必须为正整数"));
        }
        if self.workspace_slug.trim().is_empty() {
            return Err(ConfigError::invalid("workspace_slug", "不能为空"));
        }
        Ok(())
    }
}

impl Config {
    /// 读取配置：`GRADER_CONFIG` 指定的文件，或当前目录下的 `grader.toml`，再叠加环境变量
    pub fn load() -> AppResult<Self> {
        let explicit = std::env::var("GRADER_CONFIG").ok();
        let path = explicit.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);

        let config = if explicit.is_some() || Path::new(path).exists() {
            Self::from_toml_file(path)?
        } else {
            Self::default()
        };

        config.apply_env()
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    pub fn from_toml_str(content: &str, origin: &str) -> AppResult<Self> {
        let config = toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: origin.to_string(),
            source,
        })?;
        Ok(config)
    }

    pub fn from_env() -> AppResult<Self> {
        Self::default().apply_env()
    }

    /// 用环境变量覆盖配置项
    pub fn apply_env(self) -> AppResult<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let env = Overrides { lookup: &lookup };

        env.parse("MAX_CONCURRENCY", &mut self.max_concurrency, "usize")?;
        env.parse("TIMEOUT_MS", &mut self.timeout_ms, "u64")?;
        env.parse("RETRY_ATTEMPTS", &mut self.retry_attempts, "u32")?;
        env.parse("BACKOFF_BASE_MS", &mut self.backoff_base_ms, "u64")?;
        env.parse("AUTO_RETRY_FAILED", &mut self.auto_retry_failed, "bool")?;
        env.string("ANYTHINGLLM_API_URL", &mut self.anything_llm_base_url);
        env.string("ANYTHINGLLM_API_KEY", &mut self.anything_llm_api_key);
        env.optional("WORKSPACE_SLUG", &mut self.workspace_slug);
        env.string("WORKSPACE_NAME", &mut self.workspace_name);
        env.optional("CUSTOM_PROMPT", &mut self.custom_prompt);
        env.parse("LLM_TEMPERATURE", &mut self.llm_temperature, "f64")?;
        env.parse("LLM_MAX_HISTORY", &mut self.llm_max_history, "u32")?;
        env.string("DRIVE_FOLDER", &mut self.drive_folder);
        env.optional("DRIVE_ACCESS_TOKEN", &mut self.drive_access_token);
        env.parse("USE_MOCK_DRIVE", &mut self.use_mock_drive, "bool")?;
        env.string("OUTPUT_CSV", &mut self.output_csv);
        env.optional("OUTPUT_SUMMARY_JSON", &mut self.output_summary_json);
        env.string("OUTPUT_LOG_FILE", &mut self.output_log_file);
        env.parse("VERBOSE_LOGGING", &mut self.verbose_logging, "bool")?;

        Ok(self)
    }

    /// 生成调度器配置，需要已确定的工作区 slug
    pub fn batch_config(&self, workspace_slug: &str) -> AppResult<BatchConfig> {
        let batch = BatchConfig {
            max_concurrency: self.max_concurrency,
            timeout_ms: self.timeout_ms,
            retry_attempts: self.retry_attempts,
            workspace_slug: workspace_slug.to_string(),
            custom_prompt: self
                .custom_prompt
                .clone()
                .filter(|p| !p.trim().is_empty()),
            backoff_base_ms: self.backoff_base_ms,
        };
        batch.validate()?;
        Ok(batch)
    }
}

struct Overrides<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<'_, F> {
    fn parse<T: FromStr>(
        &self,
        var_name: &str,
        target: &mut T,
        expected_type: &'static str,
    ) -> Result<(), ConfigError> {
        if let Some(value) = (self.lookup)(var_name) {
            *target = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::EnvVarParseFailed {
                    var_name: var_name.to_string(),
                    value,
                    expected_type,
                })?;
        }
        Ok(())
    }

    fn string(&self, var_name: &str, target: &mut String) {
        if let Some(value) = (self.lookup)(var_name) {
            *target = value;
        }
    }

    fn optional(&self, var_name: &str, target: &mut Option<String>) {
        if let Some(value) = (self.lookup)(var_name) {
            *target = Some(value).filter(|v| !v.trim().is_empty());
        }
    }
}
