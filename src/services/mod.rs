pub mod csv_export;
pub mod grade_parser;
pub mod prompt;

pub use csv_export::{export_csv, NO_RESULTS_TO_EXPORT};
pub use grade_parser::parse_grade_response;
pub use prompt::{build_grading_message, DEFAULT_GRADING_PROMPT};
