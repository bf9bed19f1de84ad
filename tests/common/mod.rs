//! Shared test harness: an isolated registry + blob store per test, a fake
//! store API with per-device delivery payloads, a recording notifier, APK
//! fixture builders, and a minimal HTTP server for direct-URL downloads.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use bundleman::blob::FsBlobStore;
use bundleman::config::{Config, MarketSettings, NotifySettings, SigningSettings};
use bundleman::error::Result;
use bundleman::market::{
    AppDelivery, AppDetails, AppSummary, DeliveredFile, MarketAccount, MarketApi, MarketError,
    MarketSession,
};
use bundleman::notify::Notifier;
use bundleman::run::Updater;
use bundleman::signer::ArtifactSigner;
use bundleman::store::{SqliteStore, Store};
use bundleman::types::{DeviceStatus, NewApp, NewDevice};

pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: SqliteStore,
    pub blob: FsBlobStore,
    pub signer: ArtifactSigner,
    pub config: Config,
    pub notifier: RecordingNotifier,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = SqliteStore::new(temp_dir.path().join("bundleman.db")).unwrap();
        store.initialize().unwrap();
        let blob = FsBlobStore::new(temp_dir.path());

        let mut rng = rsa::rand_core::OsRng;
        let key = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pem = rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(&key, rsa::pkcs8::LineEnding::LF)
            .unwrap();
        let signer = ArtifactSigner::from_pem(&pem, "").unwrap();

        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            platform: "android".to_string(),
            device_delay_secs: 0,
            non_installable_extensions: vec!["pdf".to_string(), "html".to_string()],
            market: MarketSettings {
                base_url: "https://store.example.com".to_string(),
                username: "ops@example.org".to_string(),
                password: "secret".to_string(),
                web_host: "store.example.com".to_string(),
            },
            signing: SigningSettings {
                private_key_path: PathBuf::from("unused.pem"),
                passphrase: String::new(),
            },
            notify: NotifySettings {
                from: "updater@example.org".to_string(),
                recipients: vec!["ops@example.org".to_string()],
            },
        };

        Self {
            temp_dir,
            store,
            blob,
            signer,
            config,
            notifier: RecordingNotifier::default(),
        }
    }

    pub fn updater<'a>(&'a self, market: &'a FakeMarket) -> Updater<'a> {
        Updater {
            store: &self.store,
            blob: &self.blob,
            market,
            signer: &self.signer,
            notifier: &self.notifier,
            config: &self.config,
        }
    }

    pub fn add_device(&self, codename: &str) -> i64 {
        self.store
            .create_device(&NewDevice {
                codename: codename.to_string(),
                display_name: format!("Pixel ({codename})"),
                status: DeviceStatus::Completed,
                properties: Default::default(),
            })
            .unwrap()
    }

    pub fn add_app(&self, name: &str, package_id: &str, bundled: bool) -> i64 {
        self.store
            .create_app(&NewApp {
                name: name.to_string(),
                package_id: package_id.to_string(),
                platform: "android".to_string(),
                download_url: None,
                version_name: None,
                version_code: None,
                auto_update: true,
                is_bundled: bundled,
            })
            .unwrap()
    }

    pub fn add_direct_app(&self, name: &str, url: &str) -> i64 {
        self.store
            .create_app(&NewApp {
                name: name.to_string(),
                package_id: format!("org.example.{}", name),
                platform: "android".to_string(),
                download_url: Some(url.to_string()),
                version_name: None,
                version_code: None,
                auto_update: true,
                is_bundled: false,
            })
            .unwrap()
    }
}

/// Fake store API. Details are keyed by package id, deliveries by
/// (package id, device codename) so each device can report different splits.
#[derive(Default)]
pub struct FakeMarket {
    pub details: HashMap<String, AppDetails>,
    pub incompatible: HashSet<(String, String)>,
    pub deliveries: HashMap<(String, String), AppDelivery>,
    pub credential_logins: Mutex<usize>,
}

impl FakeMarket {
    pub fn set_details(&mut self, package_id: &str, version_name: &str, version_code: i64) {
        self.details.insert(
            package_id.to_string(),
            AppDetails {
                package_id: package_id.to_string(),
                version_name: version_name.to_string(),
                version_code,
                offer_type: 1,
                install_size: 0,
                upload_date: Some(chrono::Utc::now()),
                permissions: vec!["android.permission.INTERNET".to_string()],
            },
        );
    }

    pub fn set_delivery(
        &mut self,
        package_id: &str,
        device: &str,
        base: DeliveredFile,
        splits: Vec<DeliveredFile>,
    ) {
        self.deliveries.insert(
            (package_id.to_string(), device.to_string()),
            AppDelivery { base, splits },
        );
    }
}

impl MarketApi for FakeMarket {
    fn login_with_credentials(
        &self,
        _account: &MarketAccount,
        device: &bundleman::types::DeviceProfile,
    ) -> std::result::Result<(MarketSession, String), MarketError> {
        let mut logins = self.credential_logins.lock().unwrap();
        *logins += 1;
        Ok((
            MarketSession {
                session_token: format!("sess-{}", device.codename),
                device_codename: device.codename.clone(),
            },
            format!("refresh-{}", *logins),
        ))
    }

    fn login_with_token(
        &self,
        _account: &MarketAccount,
        token: &str,
        device: &bundleman::types::DeviceProfile,
    ) -> std::result::Result<MarketSession, MarketError> {
        Ok(MarketSession {
            session_token: token.to_string(),
            device_codename: device.codename.clone(),
        })
    }

    fn search(
        &self,
        _session: &MarketSession,
        _query: &str,
    ) -> std::result::Result<Vec<AppSummary>, MarketError> {
        Ok(Vec::new())
    }

    fn details(
        &self,
        session: &MarketSession,
        package_id: &str,
    ) -> std::result::Result<AppDetails, MarketError> {
        if self
            .incompatible
            .contains(&(package_id.to_string(), session.device_codename.clone()))
        {
            return Err(MarketError::Incompatible(
                "device profile not served".to_string(),
            ));
        }
        self.details
            .get(package_id)
            .cloned()
            .ok_or_else(|| MarketError::NotFound(package_id.to_string()))
    }

    fn delivery(
        &self,
        session: &MarketSession,
        package_id: &str,
        _version_code: i64,
        _offer_type: i32,
    ) -> std::result::Result<AppDelivery, MarketError> {
        self.deliveries
            .get(&(package_id.to_string(), session.device_codename.clone()))
            .cloned()
            .ok_or_else(|| MarketError::NotFound(package_id.to_string()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn send(&self, subject: &str, body: &str, _from: &str, _to: &[String]) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

pub fn delivered(name: &str, total_size: i64) -> DeliveredFile {
    DeliveredFile {
        name: name.to_string(),
        total_size,
        data: format!("payload of {name} ({total_size} bytes declared)").into_bytes(),
    }
}

/// Minimal single-threaded HTTP file server for direct-URL downloads.
/// Content is swappable mid-test to simulate upstream version bumps.
pub struct FileServer {
    pub base_url: String,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl FileServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base_url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let files: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::default();

        let served = Arc::clone(&files);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                // Drain headers so the client sees a clean close.
                let mut line = String::new();
                while reader.read_line(&mut line).is_ok() && line != "\r\n" && !line.is_empty() {
                    line.clear();
                }

                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();
                let body = served.lock().unwrap().get(&path).cloned();

                let _ = match body {
                    Some(bytes) => stream
                        .write_all(
                            format!(
                                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                                bytes.len()
                            )
                            .as_bytes(),
                        )
                        .and_then(|()| stream.write_all(&bytes)),
                    None => stream.write_all(
                        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    ),
                };
            }
        });

        Self { base_url, files }
    }

    pub fn put(&self, path: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), bytes);
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub mod axml {
    //! Builds binary `AndroidManifest.xml` fixtures: a UTF-8 string pool, a
    //! resource map covering the framework attribute ids, one `manifest`
    //! element carrying versionCode/versionName, and one `uses-permission`
    //! element per permission.

    use std::io::Write;

    const RES_VERSION_CODE: u32 = 0x0101_021b;
    const RES_VERSION_NAME: u32 = 0x0101_021c;
    const RES_NAME: u32 = 0x0101_0003;
    const NO_RAW_VALUE: u32 = 0xffff_ffff;
    const TYPE_STRING: u8 = 0x03;
    const TYPE_INT_DEC: u8 = 0x10;

    struct Attr {
        name: u32,
        raw: u32,
        data_type: u8,
        data: u32,
    }

    pub fn manifest(version_name: &str, version_code: u32, permissions: &[&str]) -> Vec<u8> {
        // Pool layout: attribute names first so the resource map lines up.
        let mut strings: Vec<String> = vec![
            "versionCode".to_string(),
            "versionName".to_string(),
            "name".to_string(),
            "manifest".to_string(),
            "uses-permission".to_string(),
            version_name.to_string(),
        ];
        for permission in permissions {
            strings.push((*permission).to_string());
        }

        let pool = string_pool(&strings);
        let resources = resource_map(&[RES_VERSION_CODE, RES_VERSION_NAME, RES_NAME]);

        let mut elements = start_element(
            3,
            &[
                Attr {
                    name: 0,
                    raw: NO_RAW_VALUE,
                    data_type: TYPE_INT_DEC,
                    data: version_code,
                },
                Attr {
                    name: 1,
                    raw: 5,
                    data_type: TYPE_STRING,
                    data: 5,
                },
            ],
        );
        for i in 0..permissions.len() {
            let idx = (6 + i) as u32;
            elements.extend(start_element(
                4,
                &[Attr {
                    name: 2,
                    raw: idx,
                    data_type: TYPE_STRING,
                    data: idx,
                }],
            ));
        }

        let total = 8 + pool.len() + resources.len() + elements.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&0x0003u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend(pool);
        out.extend(resources);
        out.extend(elements);
        out
    }

    fn string_pool(strings: &[String]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(data.len() as u32);
            let bytes = s.as_bytes();
            data.push(s.chars().count() as u8);
            data.push(bytes.len() as u8);
            data.extend_from_slice(bytes);
            data.push(0);
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }

        let strings_start = 28 + 4 * strings.len();
        let size = strings_start + data.len();
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&0x0001u16.to_le_bytes());
        out.extend_from_slice(&28u16.to_le_bytes());
        out.extend_from_slice(&(size as u32).to_le_bytes());
        out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // style count
        out.extend_from_slice(&0x100u32.to_le_bytes()); // UTF-8 flag
        out.extend_from_slice(&(strings_start as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // styles start
        for offset in offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend(data);
        out
    }

    fn resource_map(ids: &[u32]) -> Vec<u8> {
        let size = 8 + 4 * ids.len();
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&0x0180u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&(size as u32).to_le_bytes());
        for id in ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        out
    }

    fn start_element(name_idx: u32, attrs: &[Attr]) -> Vec<u8> {
        let size = 36 + attrs.len() * 20;
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&0x0102u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(&(size as u32).to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // line number
        out.extend_from_slice(&NO_RAW_VALUE.to_le_bytes()); // comment
        out.extend_from_slice(&NO_RAW_VALUE.to_le_bytes()); // element ns
        out.extend_from_slice(&name_idx.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // attribute start
        out.extend_from_slice(&20u16.to_le_bytes()); // attribute size
        out.extend_from_slice(&(attrs.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // id index
        out.extend_from_slice(&0u16.to_le_bytes()); // class index
        out.extend_from_slice(&0u16.to_le_bytes()); // style index
        for attr in attrs {
            out.extend_from_slice(&NO_RAW_VALUE.to_le_bytes()); // attr ns
            out.extend_from_slice(&attr.name.to_le_bytes());
            out.extend_from_slice(&attr.raw.to_le_bytes());
            out.extend_from_slice(&8u16.to_le_bytes()); // value size
            out.push(0); // res0
            out.push(attr.data_type);
            out.extend_from_slice(&attr.data.to_le_bytes());
        }
        out
    }

    /// Wraps a manifest into a minimal APK (ZIP) archive.
    pub fn apk(manifest_bytes: &[u8]) -> Vec<u8> {
        let cursor = std::io::Cursor::new(Vec::new());
        let mut archive = zip::ZipWriter::new(cursor);
        let options = zip::write::SimpleFileOptions::default();

        archive.start_file("AndroidManifest.xml", options).unwrap();
        archive.write_all(manifest_bytes).unwrap();
        archive.start_file("classes.dex", options).unwrap();
        archive.write_all(b"dex\n035\0").unwrap();

        archive.finish().unwrap().into_inner()
    }
}
