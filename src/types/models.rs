use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an emulated device profile. Only `completed` profiles
/// take part in an update pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Ready,
    Added,
    Completed,
    NotFound,
}

impl DeviceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Added => "added",
            Self::Completed => "completed",
            Self::NotFound => "not_found",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(Self::Ready),
            "added" => Some(Self::Added),
            "completed" => Some(Self::Completed),
            "not_found" => Some(Self::NotFound),
            _ => None,
        }
    }
}

/// An emulated device identity used to authenticate against the external
/// store. The property bag is opaque to the updater and forwarded verbatim
/// in the login handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: i64,
    pub codename: String,
    pub display_name: String,
    pub status: DeviceStatus,
    pub properties: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Registration payload for a device profile (admin import).
#[derive(Debug, Clone, Deserialize)]
pub struct NewDevice {
    pub codename: String,
    pub display_name: String,
    #[serde(default = "default_device_status")]
    pub status: DeviceStatus,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_device_status() -> DeviceStatus {
    DeviceStatus::Ready
}

/// One (application, platform) pair eligible for auto-update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedApp {
    pub id: i64,
    pub name: String,
    pub package_id: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    pub auto_update: bool,
    pub is_bundled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Registration payload for a tracked application (admin import).
#[derive(Debug, Clone, Deserialize)]
pub struct NewApp {
    pub name: String,
    pub package_id: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub version_code: Option<i64>,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default)]
    pub is_bundled: bool,
}

fn default_platform() -> String {
    "android".to_string()
}

/// One row per distinct version code observed for a tracked application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: i64,
    pub app_id: i64,
    pub version_code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_path: Option<String>,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub installable: bool,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// True while the stored artifact is still a single raw APK rather than a
    /// finished base+splits bundle.
    #[must_use]
    pub fn is_raw_apk(&self) -> bool {
        self.blob_path
            .as_deref()
            .is_some_and(|p| p.ends_with(".apk"))
    }

    /// True once the stored artifact is a finished base+splits ZIP bundle.
    #[must_use]
    pub fn is_bundle(&self) -> bool {
        self.blob_path
            .as_deref()
            .is_some_and(|p| p.ends_with(".zip"))
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.blob_path
            .as_deref()
            .map(|p| p.rsplit('/').next().unwrap_or(p))
    }
}

/// A split APK fragment tied to the version code that produced it. The name
/// is synthetic: ABI-classed splits carry the declared byte size as a suffix
/// so size variants keep distinct identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitArtifact {
    pub id: i64,
    pub app_id: i64,
    pub record_id: i64,
    pub name: String,
    pub blob_path: String,
    pub size_bytes: i64,
}

impl SplitArtifact {
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.blob_path.rsplit('/').next().unwrap_or(&self.blob_path)
    }
}

/// Insert payload for a split artifact; identity is
/// (app, record, name, size).
#[derive(Debug, Clone)]
pub struct NewSplit {
    pub app_id: i64,
    pub record_id: i64,
    pub name: String,
    pub blob_path: String,
    pub size_bytes: i64,
}

/// Whether a file name points at something a device can install. Extensions
/// on the denylist (pdf, html, ...) are distributed but not installable.
#[must_use]
pub fn is_installable_name(file_name: &str, denylist: &[String]) -> bool {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => !denylist.iter().any(|d| d.eq_ignore_ascii_case(ext)),
        None => true,
    }
}
