pub mod chains;
pub mod config;
pub mod cursor;
pub mod decoders;
pub mod pipeline;
pub mod projection;
pub mod store;
pub mod types;
pub mod watcher;
