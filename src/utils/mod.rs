pub mod drive_url;
pub mod logging;

pub use drive_url::{extract_folder_id, is_supported_file_type, is_valid_folder_id};
pub use logging::truncate_text;
