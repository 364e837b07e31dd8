//! 成绩 CSV 导出

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::ExportError;
use crate::models::{FileProcessingResult, ProcessingProgress, ProcessingStatus, RUBRIC_KEYS};

/// 没有任何成功记录时返回的提示文本
pub const NO_RESULTS_TO_EXPORT: &str = "没有可导出的成功结果";

pub const CSV_HEADERS: [&str; 7] = [
    "FileName",
    "Score",
    "ContentQuality",
    "Structure",
    "Analysis",
    "Comments",
    "ProcessingTime",
];

/// 整数分数不带小数点
fn format_score(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

/// 按给定引号策略编码一行（不含换行）
fn encode<I, T>(fields: I, style: QuoteStyle) -> Result<String, ExportError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(style)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))?;
    let mut line = String::from_utf8(bytes)?;
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

/// 评语列总是加引号，其余字段只在需要时加
fn row(record: &FileProcessingResult) -> Result<Option<String>, ExportError> {
    let Some(grade) = record.result.as_ref() else {
        return Ok(None);
    };
    let [content_quality, structure, analysis] =
        RUBRIC_KEYS.map(|key| grade.sub_score(key).map(format_score).unwrap_or_default());

    let leading = encode(
        [
            record.file_name.clone(),
            format_score(grade.score),
            content_quality,
            structure,
            analysis,
        ],
        QuoteStyle::Necessary,
    )?;
    let comments = encode([grade.comments.as_str()], QuoteStyle::Always)?;
    let elapsed = encode([format!("{}s", record.elapsed_secs())], QuoteStyle::Necessary)?;

    Ok(Some(format!("{},{},{}", leading, comments, elapsed)))
}

/// 导出状态为 done 的记录，按文件名排序
///
/// 评语内部引号按 CSV 规则双写
pub fn export_csv(progress: &ProcessingProgress) -> Result<String, ExportError> {
    let mut done: Vec<&FileProcessingResult> = progress
        .results
        .values()
        .filter(|r| r.status == ProcessingStatus::Done)
        .collect();

    if done.is_empty() {
        return Ok(NO_RESULTS_TO_EXPORT.to_string());
    }
    done.sort_by(|a, b| a.file_name.cmp(&b.file_name).then(a.file_id.cmp(&b.file_id)));

    let mut lines = vec![encode(CSV_HEADERS, QuoteStyle::Necessary)?];
    for record in done {
        if let Some(line) = row(record)? {
            lines.push(line);
        }
    }
    Ok(lines.join("\n"))
}
