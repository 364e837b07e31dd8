//! 评分提示词

/// 默认评分标准
pub const DEFAULT_GRADING_PROMPT: &str = "你是一位专业的作业评分助教。请根据以下评分标准为学生作业评分：

评分标准：
1. 内容品质 content_quality (40%)：内容的准确性、完整性和相关性
2. 结构组织 structure (30%)：文章结构是否清晰、逻辑是否合理
3. 分析深度 analysis (30%)：是否有深入的思考和分析

评分范围：0-100分
- 90-100分：优秀
- 80-89分：良好
- 70-79分：可接受
- 60-69分：需要改进
- 0-59分：不及格

请确保评分客观公正，评语需说明各评分项的表现并给出建设性的建议。";

/// 回复格式示例，模型必须严格按此结构返回
const REPLY_FORMAT: &str = r#"{
  "score": 85,
  "comments": "整体表现良好，论述清晰，结构完整。建议加强引用资料的多样性。",
  "rubric": [
    {"key": "content_quality", "description": "内容品质", "weight": 0.4, "subScore": 88},
    {"key": "structure", "description": "结构组织", "weight": 0.3, "subScore": 85},
    {"key": "analysis", "description": "分析深度", "weight": 0.3, "subScore": 80}
  ]
}"#;

/// 实际使用的评分标准：自定义优先，空白视为未设置
pub fn effective_prompt(custom_prompt: Option<&str>) -> &str {
    custom_prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_GRADING_PROMPT)
}

/// 构建发送给评分工作区的对话消息
///
/// 文件已提前上传到工作区，消息里只引用文件名
pub fn build_grading_message(file_name: &str, custom_prompt: Option<&str>) -> String {
    format!(
        "请评分以下作业文件：

文件名称：{}

评分要求：
{}

请仔细查看已上传的文件内容，并根据评分标准进行评分。

请严格按照以下 JSON 格式回复（不要包含任何其他文字）：
{}",
        file_name,
        effective_prompt(custom_prompt),
        REPLY_FORMAT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_prompt_overrides_default() {
        let msg = build_grading_message("报告.pdf", Some("只评价引用格式"));
        assert!(msg.contains("报告.pdf"));
        assert!(msg.contains("只评价引用格式"));
        assert!(!msg.contains("内容品质 content_quality (40%)"));
    }

    #[test]
    fn test_blank_prompt_falls_back_to_default() {
        assert_eq!(effective_prompt(Some("   ")), DEFAULT_GRADING_PROMPT);
        assert_eq!(effective_prompt(None), DEFAULT_GRADING_PROMPT);
    }

    #[test]
    fn test_reply_format_is_valid_grade() {
        let grade = crate::services::grade_parser::parse_grade_response(REPLY_FORMAT).unwrap();
        assert_eq!(grade.score, 85.0);
        assert_eq!(grade.rubric.len(), 3);
    }
}
