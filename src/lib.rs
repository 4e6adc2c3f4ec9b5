// quarksave - browse Quark drive shares and save them into your own drive
// Library crate shared by the CLI binary

pub mod config;
pub mod credential_store;
pub mod directory;
pub mod interactive;
pub mod providers;
pub mod render;
pub mod selection;
pub mod transfer;
pub mod traversal;

pub use config::ClientConfig;
pub use providers::{FileRecord, ProviderError, QuarkClient, ShareLink, ShareSession};
