//! 评分结果模型
//!
//! 评分服务返回的 JSON 在边界处反序列化为 [`GradeResult`]，
//! 随后必须通过 [`GradeResult::validate`]，越界一律判为失败，不做截断。

use serde::{Deserialize, Serialize};

use crate::error::GradeParseError;

/// CSV 导出时单独成列的评分项
pub const RUBRIC_KEYS: [&str; 3] = ["content_quality", "structure", "analysis"];

/// 单个评分项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricItem {
    pub key: String,
    #[serde(default)]
    pub description: String,
    /// 权重，范围 [0, 1]
    pub weight: f64,
    /// 该项得分，范围 [0, 100]
    pub sub_score: f64,
}

/// 单个文件的评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    /// 总分，范围 [0, 100]
    pub score: f64,
    pub comments: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rubric: Vec<RubricItem>,
}

impl GradeResult {
    /// 校验分数与评分项
    pub fn validate(&self) -> Result<(), GradeParseError> {
        if !in_range(self.score, 100.0) {
            return Err(GradeParseError::ScoreOutOfRange { score: self.score });
        }

        for item in &self.rubric {
            if !in_range(item.weight, 1.0) {
                return Err(GradeParseError::WeightOutOfRange {
                    key: item.key.clone(),
                    weight: item.weight,
                });
            }
            if !in_range(item.sub_score, 100.0) {
                return Err(GradeParseError::SubScoreOutOfRange {
                    key: item.key.clone(),
                    sub_score: item.sub_score,
                });
            }
        }

        Ok(())
    }

    /// 按 key 查找评分项得分
    pub fn sub_score(&self, key: &str) -> Option<f64> {
        self.rubric
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.sub_score)
    }
}

// NaN 不满足任何比较，自然被拒绝
fn in_range(value: f64, max: f64) -> bool {
    (0.0..=max).contains(&value)
}
