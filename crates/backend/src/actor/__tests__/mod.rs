mod helpers;
mod registry;
mod scenario;
mod watcher;
