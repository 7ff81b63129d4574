//! Service layer
//!
//! - [`code`] - Keeping a project's chunk collection in sync with its files

pub mod code;
