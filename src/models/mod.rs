pub mod drive_file;
pub mod grade;
pub mod progress;
pub mod record;
pub mod workspace;

pub use drive_file::{DriveFile, DriveFileList};
pub use grade::{GradeResult, RubricItem, RUBRIC_KEYS};
pub use progress::{ProcessingProgress, ProgressSummary};
pub use record::{FileProcessingResult, ProcessingStatus, CANCELLED_BY_USER};
pub use workspace::{
    ChatMode, ChatRequest, ChatResponse, HealthStatus, UploadAck, Workspace, WorkspaceConfig,
};
