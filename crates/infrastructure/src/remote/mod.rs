pub mod http_upload_client;

pub use http_upload_client::HttpUploadClient;
