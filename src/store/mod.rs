mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the registry interface: device profiles, tracked apps,
/// artifact records, split artifacts and the store-account token cache.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Device profile operations
    fn create_device(&self, device: &NewDevice) -> Result<i64>;
    fn get_device(&self, codename: &str) -> Result<Option<DeviceProfile>>;
    fn list_completed_devices(&self) -> Result<Vec<DeviceProfile>>;

    // Tracked application operations
    fn create_app(&self, app: &NewApp) -> Result<i64>;
    fn get_app(&self, name: &str, platform: &str) -> Result<Option<TrackedApp>>;
    fn list_auto_update_apps(&self, platform: &str) -> Result<Vec<TrackedApp>>;
    fn update_app(&self, app: &TrackedApp) -> Result<()>;

    // Artifact record operations
    fn get_or_create_record(&self, app_id: i64, version_code: i64)
    -> Result<(ArtifactRecord, bool)>;
    fn get_record(&self, record_id: i64) -> Result<Option<ArtifactRecord>>;
    fn list_records(&self, app_id: i64) -> Result<Vec<ArtifactRecord>>;
    fn update_record_binary(&self, record: &ArtifactRecord) -> Result<()>;
    fn attach_record_device(&self, record_id: i64, device_id: i64) -> Result<()>;

    /// Removes every artifact record and split for an app in one step.
    /// Used when the observed version string changes, so stale version codes
    /// never outlive the version they were seen under.
    fn delete_app_artifacts(&self, app_id: i64) -> Result<usize>;

    // Split artifact operations
    fn get_or_create_split(&self, split: &NewSplit) -> Result<(SplitArtifact, bool)>;
    fn list_record_splits(&self, record_id: i64) -> Result<Vec<SplitArtifact>>;
    fn attach_split_device(&self, split_id: i64, device_id: i64) -> Result<()>;

    // Store-account token cache
    fn cached_token(&self, account: &str) -> Result<Option<String>>;
    fn put_token(&self, account: &str, token: &str) -> Result<()>;
    fn clear_token(&self, account: &str) -> Result<()>;

    fn close(&self) -> Result<()>;
}
