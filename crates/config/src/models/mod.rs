pub mod app_config;
pub mod database;
pub mod executor;
pub mod observability;
pub mod remote;
pub mod retry;

pub use app_config::*;
pub use database::*;
pub use executor::*;
pub use observability::*;
pub use remote::*;
pub use retry::*;
