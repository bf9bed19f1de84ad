mod client;
mod protocol;

pub use client::{HttpMarketClient, MarketClientConfig};
pub use protocol::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("account locked, manual unlock required at {url}")]
    CaptchaLocked { url: String },

    #[error("package incompatible with device: {0}")]
    Incompatible(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// The slice of the external store protocol the updater calls. One session at
/// a time, bound to a single emulated device identity.
pub trait MarketApi: Send + Sync {
    /// Full credential login. Mints a long-lived token alongside the session;
    /// the caller is responsible for caching it.
    fn login_with_credentials(
        &self,
        account: &MarketAccount,
        device: &crate::types::DeviceProfile,
    ) -> Result<(MarketSession, String), MarketError>;

    /// Token-based login against a previously minted long-lived token.
    fn login_with_token(
        &self,
        account: &MarketAccount,
        token: &str,
        device: &crate::types::DeviceProfile,
    ) -> Result<MarketSession, MarketError>;

    fn search(&self, session: &MarketSession, query: &str)
    -> Result<Vec<AppSummary>, MarketError>;

    fn details(&self, session: &MarketSession, package_id: &str)
    -> Result<AppDetails, MarketError>;

    fn delivery(
        &self,
        session: &MarketSession,
        package_id: &str,
        version_code: i64,
        offer_type: i32,
    ) -> Result<AppDelivery, MarketError>;
}
