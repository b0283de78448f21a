pub mod actor;
pub mod domain;
pub mod work_area;

mod daemon;
pub use daemon::{Daemon, StartupError};
