//! CLI command implementations

mod context;
mod search;
mod status;
mod sync;
mod watch;

pub use context::project_root;
pub use search::cmd_search;
pub use status::cmd_status;
pub use sync::cmd_sync;
pub use watch::cmd_watch;
