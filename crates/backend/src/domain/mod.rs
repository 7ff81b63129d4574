//! Domain types shared by the engine, watcher and storage adapters

pub mod chunk;
pub mod config;
pub mod project;
