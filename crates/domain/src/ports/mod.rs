pub mod materializer;
pub mod progress;
pub mod upload;

pub use materializer::{MaterializedFile, ResourceMaterializer};
pub use progress::{NoopProgressSink, ProgressSink};
pub use upload::RemoteUploadService;
