mod config;
mod error;
mod store;

pub use config::RestConfig;
pub use error::{RestError, RestResult};
pub use store::RestRemoteSource;
