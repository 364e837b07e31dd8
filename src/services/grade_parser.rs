//! 评分响应解析 - 业务能力层
//!
//! 模型回复常在 JSON 前后附带说明文字，这里取第一个 `{` 到最后一个 `}` 之间的片段，
//! 解析后按评分结构逐项校验。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::GradeParseError;
use crate::models::GradeResult;
use crate::utils::truncate_text;

fn json_span() -> &'static Regex {
    static SPAN: OnceLock<Regex> = OnceLock::new();
    // 贪婪匹配，不识别嵌套层级
    SPAN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("json span pattern"))
}

/// 提取回复中的 JSON 对象
pub fn extract_json(response: &str) -> Result<JsonValue, GradeParseError> {
    let span = json_span()
        .find(response)
        .ok_or(GradeParseError::NoJsonObject)?;

    debug!("找到 JSON 片段: {}", truncate_text(span.as_str(), 200));

    serde_json::from_str(span.as_str()).map_err(GradeParseError::InvalidJson)
}

/// 解析并校验评分回复
pub fn parse_grade_response(response: &str) -> Result<GradeResult, GradeParseError> {
    let value = extract_json(response)?;
    let grade: GradeResult = serde_json::from_value(value).map_err(GradeParseError::Schema)?;
    grade.validate()?;
    Ok(grade)
}
