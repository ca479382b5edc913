//! # Uploader Testing Utils
//!
//! Shared testing utilities for the uploader workspace.
//!
//! ## Features
//!
//! - **Mock Ports**: scripted remote service, materializer and progress sink
//! - **Test Data Builders**: `UploadInputBuilder` and `TaskRecordBuilder`
//! - **Helpers**: polling utilities for asynchronous assertions
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! uploader-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
