//! Shared types, error model, and configuration for LotScout.
//!
//! This crate is the foundation depended on by all other LotScout crates.
//! It provides:
//! - [`LotScoutError`] — the unified error type
//! - Domain types ([`Auction`], [`Lot`])
//! - Configuration ([`AppConfig`], config loading, worker sizing)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, Dispatch, ExtractConfig, RefreshConfig, SiteConfig,
    TelegramConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    worker_count,
};
pub use error::{LotScoutError, Result};
pub use types::{Auction, Lot};
