pub mod backend;
pub mod breaker;
pub mod error;
pub mod http;

pub use backend::*;
pub use breaker::*;
pub use error::{ClientError, Result as ClientResult};
pub use http::*;
