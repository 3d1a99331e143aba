pub mod event;
pub mod operation;
pub mod outcome;
pub mod status;

pub use event::*;
pub use operation::*;
pub use outcome::*;
pub use status::*;
