use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Store-account credentials, shared across all device profiles.
#[derive(Debug, Clone)]
pub struct MarketAccount {
    pub username: String,
    pub password: String,
}

/// A live store session bound to one device identity.
#[derive(Debug, Clone)]
pub struct MarketSession {
    pub session_token: String,
    pub device_codename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSummary {
    pub package_id: String,
    pub title: String,
}

/// Details document for one package as seen by the current device.
#[derive(Debug, Clone, Deserialize)]
pub struct AppDetails {
    pub package_id: String,
    pub version_name: String,
    pub version_code: i64,
    #[serde(default)]
    pub offer_type: i32,
    #[serde(default)]
    pub install_size: i64,
    #[serde(default)]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// One delivered binary: the base APK or a single split.
#[derive(Debug, Clone)]
pub struct DeliveredFile {
    pub name: String,
    pub total_size: i64,
    pub data: Vec<u8>,
}

/// Delivery payload for one (package, version code) on one device. Splits are
/// present only for packages the store distributes as base+splits.
#[derive(Debug, Clone)]
pub struct AppDelivery {
    pub base: DeliveredFile,
    pub splits: Vec<DeliveredFile>,
}
