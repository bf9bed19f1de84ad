//! # Bundleman
//!
//! An updater for Android applications distributed outside the usual store
//! channels. Each run logs in against the external store once per emulated
//! device profile, fetches newer artifacts for every auto-update app,
//! aggregates per-ABI split APKs across devices, assembles base+splits ZIP
//! bundles, signs and uploads the results, and sends one summary
//! notification.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use bundleman::config::Config;
//! use bundleman::blob::FsBlobStore;
//! use bundleman::market::{HttpMarketClient, MarketClientConfig};
//! use bundleman::notify::LogNotifier;
//! use bundleman::run::Updater;
//! use bundleman::signer::ArtifactSigner;
//! use bundleman::store::{SqliteStore, Store};
//!
//! let config = Config::load("bundleman.toml").unwrap();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//! // Wire up the collaborators and run one pass:
//! // Updater { store: &store, ... }.run()
//! ```

pub mod apk;
pub mod blob;
pub mod bundle;
pub mod config;
pub mod error;
pub mod fetch;
pub mod market;
pub mod notify;
pub mod run;
pub mod session;
pub mod signer;
pub mod splits;
pub mod store;
pub mod types;
