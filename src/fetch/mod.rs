mod direct;
mod market;

use crate::blob::BlobStore;
use crate::market::{MarketApi, MarketSession};
use crate::run::RunLog;
use crate::signer::ArtifactSigner;
use crate::store::Store;
use crate::types::{DeviceProfile, TrackedApp};

/// Per-(device, app) result. Everything except `Updated` is non-fatal to the
/// run loop; `Failed` carries the logged reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Updated,
    NotUpdated,
    IncompatibleDevice,
    Failed(String),
}

impl FetchOutcome {
    #[must_use]
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated)
    }
}

/// Acquisition strategy, decided once per app before any network traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStrategy<'a> {
    /// Query the store by package id; the only path that can yield splits.
    Market,
    /// Download the file behind the app's own URL.
    Direct(&'a str),
}

impl<'a> FetchStrategy<'a> {
    /// URLs pointing back at the store's web frontend still go through the
    /// store API; anything else is a direct download.
    #[must_use]
    pub fn select(app: &'a TrackedApp, store_host: &str) -> Self {
        match app.download_url.as_deref() {
            Some(url) if !url.is_empty() && !url.contains(store_host) => Self::Direct(url),
            _ => Self::Market,
        }
    }
}

pub struct Fetcher<'a> {
    pub store: &'a dyn Store,
    pub blob: &'a dyn BlobStore,
    pub market: &'a dyn MarketApi,
    pub signer: &'a ArtifactSigner,
    pub http: &'a reqwest::blocking::Client,
    pub store_host: &'a str,
    pub non_installable: &'a [String],
}

impl Fetcher<'_> {
    /// Processes one app for one device. Errors never escape this call; they
    /// are logged and folded into the outcome.
    pub fn fetch_app(
        &self,
        app: &mut TrackedApp,
        session: &MarketSession,
        device: &DeviceProfile,
        log: &mut RunLog,
    ) -> FetchOutcome {
        match FetchStrategy::select(app, self.store_host) {
            FetchStrategy::Market => self.fetch_from_market(app, session, device, log),
            FetchStrategy::Direct(url) => {
                let url = url.to_string();
                self.fetch_from_url(app, &url, device, log)
            }
        }
    }
}

/// Deterministic blob path for an app's primary artifact.
pub(crate) fn artifact_path(app: &TrackedApp, version_code: i64, extension: &str) -> String {
    format!(
        "apps/{}-{}-{}.{}",
        slug(&app.name),
        app.platform,
        version_code,
        extension
    )
}

pub(crate) fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
