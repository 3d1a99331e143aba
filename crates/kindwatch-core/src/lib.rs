pub mod backoff;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod guard;
pub mod normalize;
pub mod observer;
pub mod oracle;
pub mod poller;
pub mod probes;
pub mod reconciler;
pub mod routes;
pub mod stall;
pub mod submit;
pub mod transport;
pub mod validate;
pub mod watcher;

#[doc(hidden)]
pub mod testing;

pub use backoff::*;
pub use config::*;
pub use error::*;
pub use event_bus::*;
pub use guard::*;
pub use normalize::*;
pub use observer::*;
pub use oracle::*;
pub use poller::*;
pub use probes::*;
pub use reconciler::*;
pub use routes::*;
pub use stall::*;
pub use submit::*;
pub use transport::*;
pub use validate::*;
pub use watcher::*;
