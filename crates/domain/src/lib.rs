pub mod entities;
pub mod observation;
pub mod ports;
pub mod repositories;

pub use entities::*;
pub use observation::{RecordPublisher, RecordSubscription};
pub use ports::*;
pub use repositories::*;
pub use uploader_errors::{FailureClass, RemoteError, UploadError, UploadResult};
