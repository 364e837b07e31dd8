//! Google Drive 链接与文件类型工具

use std::sync::OnceLock;

use regex::Regex;

/// 支持评分的 MIME 类型
pub const SUPPORTED_MIME_TYPES: [&str; 6] = [
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.google-apps.document",
    "application/pdf",
    "text/plain",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.google-apps.presentation",
];

fn folder_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"/folders/([A-Za-z0-9_-]+)").expect("folder pattern"),
            Regex::new(r"id=([A-Za-z0-9_-]+)").expect("id pattern"),
            Regex::new(r"folders%2F([A-Za-z0-9_-]+)").expect("encoded folder pattern"),
        ]
    })
}

fn bare_id() -> &'static Regex {
    static BARE: OnceLock<Regex> = OnceLock::new();
    BARE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("bare id pattern"))
}

/// 从各种格式的 Drive 链接中提取文件夹ID
///
/// 支持：
/// - `https://drive.google.com/drive/folders/<ID>`
/// - `https://drive.google.com/drive/folders/<ID>?usp=sharing`
/// - `https://drive.google.com/drive/u/0/folders/<ID>`
/// - `...?id=<ID>`、URL 编码的 `folders%2F<ID>`
/// - 直接给出的ID
pub fn extract_folder_id(url: &str) -> Option<String> {
    for pattern in folder_patterns() {
        if let Some(caps) = pattern.captures(url) {
            return Some(caps[1].to_string());
        }
    }

    let trimmed = url.trim();
    if bare_id().is_match(trimmed) {
        return Some(trimmed.to_string());
    }

    None
}

/// 是否为 Drive 文件夹链接
pub fn validate_url(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };

    let is_drive = parsed
        .host_str()
        .map(|host| host.contains("drive.google.com"))
        .unwrap_or(false);

    is_drive && (url.contains("/folders/") || url.contains("folders%2F"))
}

/// Drive 文件夹ID至少 25 个字符
pub fn is_valid_folder_id(folder_id: &str) -> bool {
    folder_id.len() >= 25
        && folder_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn is_supported_file_type(mime_type: &str) -> bool {
    SUPPORTED_MIME_TYPES.contains(&mime_type)
}

/// MIME 类型的显示名称
pub fn file_type_display(mime_type: &str) -> &'static str {
    match mime_type {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "Word",
        "application/vnd.google-apps.document" => "Google Docs",
        "application/pdf" => "PDF",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            "PowerPoint"
        }
        "application/vnd.google-apps.presentation" => "Google Slides",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "Excel",
        "application/vnd.google-apps.spreadsheet" => "Google Sheets",
        "text/plain" => "Text",
        "image/jpeg" => "JPEG",
        "image/png" => "PNG",
        "image/gif" => "GIF",
        _ => "Unknown",
    }
}

/// 格式化文件大小，如 `1.5 KB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let rounded = (size * 10.0).round() / 10.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms";

    #[test]
    fn test_extract_folder_id() {
        let cases = [
            format!("https://drive.google.com/drive/folders/{}", ID),
            format!("https://drive.google.com/drive/folders/{}?usp=sharing", ID),
            format!("https://drive.google.com/drive/u/0/folders/{}", ID),
            format!("https://drive.google.com/open?id={}", ID),
            format!("https://accounts.google.com/continue=drive%2Ffolders%2F{}", ID),
            format!("  {}  ", ID),
        ];
        for url in cases {
            assert_eq!(extract_folder_id(&url).as_deref(), Some(ID), "url: {}", url);
        }
        assert_eq!(extract_folder_id("https://example.com/some/path"), None);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url(&format!(
            "https://drive.google.com/drive/folders/{}",
            ID
        )));
        assert!(!validate_url("https://drive.google.com/file/d/abc"));
        assert!(!validate_url(&format!("https://example.com/folders/{}", ID)));
        assert!(!validate_url("not a url"));
        assert!(!validate_url(""));
    }

    #[test]
    fn test_is_valid_folder_id() {
        assert!(is_valid_folder_id(ID));
        assert!(is_valid_folder_id("1a2b3c4d5e6f7g8h9i0j1k2l3"));
        assert!(!is_valid_folder_id("short"));
        assert!(!is_valid_folder_id("1a2b3c4d5e6f7g8h9i0j1k2l3!"));
    }

    #[test]
    fn test_file_types() {
        assert!(is_supported_file_type("application/pdf"));
        assert!(!is_supported_file_type("image/jpeg"));
        assert_eq!(file_type_display("application/pdf"), "PDF");
        assert_eq!(file_type_display("application/zip"), "Unknown");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1 MB");
    }
}
