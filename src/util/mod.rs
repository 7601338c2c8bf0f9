//! Small helpers shared across modules.

mod time;

pub use time::now_unix_seconds;
