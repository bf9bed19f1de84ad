pub const SCHEMA: &str = r#"
-- Emulated device identities used to log in against the external store
CREATE TABLE IF NOT EXISTS device_profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    codename TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ready',

    -- Opaque JSON build-property bag, forwarded in the login handshake
    properties TEXT NOT NULL DEFAULT '{}',

    created_at TEXT DEFAULT (datetime('now'))
);

-- One row per (application, platform) pair eligible for auto-update
CREATE TABLE IF NOT EXISTS apps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    package_id TEXT NOT NULL,
    platform TEXT NOT NULL DEFAULT 'android',

    download_url TEXT,            -- NULL = fetch through the store
    version_name TEXT,
    version_code INTEGER,
    released_at TEXT,
    auto_update INTEGER NOT NULL DEFAULT 0,
    is_bundled INTEGER NOT NULL DEFAULT 0,  -- base+splits bundle target
    permissions TEXT,

    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(name, platform)
);

-- One row per distinct version code observed for an app
CREATE TABLE IF NOT EXISTS artifact_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    version_code INTEGER NOT NULL,

    blob_path TEXT,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    checksum TEXT,                -- hex sha256 of the stored binary
    signature TEXT,               -- base64 RSA signature of the stored binary
    installable INTEGER NOT NULL DEFAULT 1,

    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(app_id, version_code)
);

-- Devices that observed/confirmed a version code
CREATE TABLE IF NOT EXISTS record_devices (
    record_id INTEGER NOT NULL REFERENCES artifact_records(id) ON DELETE CASCADE,
    device_id INTEGER NOT NULL REFERENCES device_profiles(id) ON DELETE CASCADE,
    PRIMARY KEY (record_id, device_id)
);

-- Split APK fragments; record_id records provenance and does not cascade
CREATE TABLE IF NOT EXISTS split_artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    record_id INTEGER NOT NULL REFERENCES artifact_records(id),
    name TEXT NOT NULL,           -- synthetic name, size-suffixed for ABI splits
    blob_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(app_id, record_id, name, size_bytes)
);

CREATE TABLE IF NOT EXISTS split_devices (
    split_id INTEGER NOT NULL REFERENCES split_artifacts(id) ON DELETE CASCADE,
    device_id INTEGER NOT NULL REFERENCES device_profiles(id) ON DELETE CASCADE,
    PRIMARY KEY (split_id, device_id)
);

-- Account-level store token cache; only one device's session is live at a time
CREATE TABLE IF NOT EXISTS market_tokens (
    account TEXT PRIMARY KEY,
    token TEXT NOT NULL,
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_apps_platform ON apps(platform);
CREATE INDEX IF NOT EXISTS idx_records_app ON artifact_records(app_id);
CREATE INDEX IF NOT EXISTS idx_splits_app ON split_artifacts(app_id);
CREATE INDEX IF NOT EXISTS idx_splits_record ON split_artifacts(record_id);
"#;
