pub mod executor;
pub mod upload_metrics;


pub use executor::UploadTaskExecutor;
pub use upload_metrics::UploadMetrics;
