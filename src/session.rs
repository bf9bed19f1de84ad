use thiserror::Error;

use crate::market::{MarketAccount, MarketApi, MarketError, MarketSession};
use crate::run::RunLog;
use crate::store::Store;
use crate::types::DeviceProfile;

/// Token validation attempts before falling back to a credential login.
const MAX_TOKEN_ATTEMPTS: u32 = 2;

/// All login failures are device-recoverable: the caller skips to the next
/// device profile and the run continues.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("credential login failed: {0}")]
    Credentials(String),

    #[error("account locked, manual unlock required at {url}")]
    CaptchaLocked { url: String },

    #[error("session probe failed: {0}")]
    Probe(String),

    #[error("token cache error: {0}")]
    TokenCache(#[from] crate::error::Error),
}

/// Owns the store-account credential cycle. The store API keeps per-device
/// session affinity, so only one device's session is live at a time.
pub struct SessionManager<'a> {
    market: &'a dyn MarketApi,
    store: &'a dyn Store,
    account: &'a MarketAccount,
}

impl<'a> SessionManager<'a> {
    pub fn new(
        market: &'a dyn MarketApi,
        store: &'a dyn Store,
        account: &'a MarketAccount,
    ) -> Self {
        Self {
            market,
            store,
            account,
        }
    }

    /// Obtains a working session for one device. Prefers the centrally cached
    /// token; a token that fails login or the probe is cleared and replaced by
    /// one fresh credential login.
    pub fn login(
        &self,
        device: &DeviceProfile,
        log: &mut RunLog,
    ) -> Result<DeviceSession<'a>, LoginError> {
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let Some(token) = self.store.cached_token(&self.account.username)? else {
                break;
            };

            match self.market.login_with_token(self.account, &token, device) {
                Ok(session) => {
                    if self.probe(&session) {
                        return Ok(self.wrap(session));
                    }
                    log.info(format!(
                        "{}: cached token failed probe (attempt {attempt}/{MAX_TOKEN_ATTEMPTS})",
                        device.codename
                    ));
                }
                Err(e) => {
                    log.info(format!("{}: token login rejected: {e}", device.codename));
                    break;
                }
            }
        }

        // Fresh cycle: clear whatever token was cached and mint a new one.
        self.store.clear_token(&self.account.username)?;

        match self.market.login_with_credentials(self.account, device) {
            Ok((session, token)) => {
                self.store.put_token(&self.account.username, &token)?;
                if !self.probe(&session) {
                    return Err(LoginError::Probe(format!(
                        "fresh session unusable for {}",
                        device.codename
                    )));
                }
                Ok(self.wrap(session))
            }
            Err(MarketError::CaptchaLocked { url }) => {
                log.error(format!(
                    "store account is captcha-locked; visit {url} to unlock it manually"
                ));
                Err(LoginError::CaptchaLocked { url })
            }
            Err(e) => Err(LoginError::Credentials(e.to_string())),
        }
    }

    /// Lightweight probe call declaring a session usable.
    fn probe(&self, session: &MarketSession) -> bool {
        self.market.search(session, "a").is_ok()
    }

    fn wrap(&self, session: MarketSession) -> DeviceSession<'a> {
        DeviceSession {
            session,
            store: self.store,
            account: self.account.username.clone(),
        }
    }
}

/// A live session scoped to one device. Dropping it clears the cached token
/// on every exit path, so the next device always starts a clean
/// credential/token cycle.
pub struct DeviceSession<'a> {
    session: MarketSession,
    store: &'a dyn Store,
    account: String,
}

impl DeviceSession<'_> {
    #[must_use]
    pub fn market_session(&self) -> &MarketSession {
        &self.session
    }
}

impl Drop for DeviceSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.clear_token(&self.account) {
            tracing::warn!("failed to clear cached store token: {e}");
        }
    }
}
