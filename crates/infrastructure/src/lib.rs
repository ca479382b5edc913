pub mod database;
pub mod in_memory_store;
pub mod materializer;
pub mod progress;
pub mod remote;

pub use database::*;
pub use in_memory_store::InMemoryTaskRecordRepository;
pub use materializer::LocalFileMaterializer;
pub use progress::{ChannelProgressSink, TracingProgressSink};
pub use remote::HttpUploadClient;
