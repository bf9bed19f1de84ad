use std::io::Read;

use chrono::Utc;
use sha2::{Digest, Sha256};

use super::{FetchOutcome, Fetcher, artifact_path};
use crate::apk;
use crate::error::{Error, Result};
use crate::run::RunLog;
use crate::types::{DeviceProfile, TrackedApp, is_installable_name};

/// Direct downloads carry small installers and manifests, never full
/// binaries; anything larger than this is treated as an upstream error.
pub const DIRECT_DOWNLOAD_LIMIT: usize = 150 * 1024;

impl Fetcher<'_> {
    /// Direct-URL acquisition: bounded download with a streaming digest,
    /// version metadata read out of the package itself. No split handling on
    /// this path.
    pub(super) fn fetch_from_url(
        &self,
        app: &mut TrackedApp,
        url: &str,
        device: &DeviceProfile,
        log: &mut RunLog,
    ) -> FetchOutcome {
        match self.apply_direct(app, url, device, log) {
            Ok(outcome) => outcome,
            Err(e) => {
                log.error(format!(
                    "{}: direct download failed on {}: {e}",
                    app.name, device.codename
                ));
                FetchOutcome::Failed(e.to_string())
            }
        }
    }

    fn apply_direct(
        &self,
        app: &mut TrackedApp,
        url: &str,
        device: &DeviceProfile,
        log: &mut RunLog,
    ) -> Result<FetchOutcome> {
        let (data, digest) = self.download_bounded(url)?;

        let file_name = url
            .rsplit('/')
            .next()
            .and_then(|tail| tail.split('?').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("download");
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string());

        let version_code = if extension == "apk" {
            let package = apk::read_package_info(&data)?;
            let version_name = package
                .version_name
                .ok_or_else(|| Error::Metadata("package reports no version name".to_string()))?;
            let version_code = package
                .version_code
                .ok_or_else(|| Error::Metadata("package reports no version code".to_string()))?;

            if app.version_name.as_deref() != Some(version_name.as_str()) {
                self.store.delete_app_artifacts(app.id)?;
                app.version_name = Some(version_name);
                app.released_at = Some(Utc::now());
            }
            app.version_code = Some(version_code);
            if !package.permissions.is_empty() {
                app.permissions = Some(package.permissions.join("\n"));
            }
            self.store.update_app(app)?;
            version_code
        } else {
            // No embedded metadata; the content digest is the change signal.
            // Direct targets keep at most one record, so a changed digest
            // replaces it under the app's current version code.
            let existing = self.store.list_records(app.id)?;
            if let Some(record) = existing
                .iter()
                .find(|r| r.checksum.as_deref() == Some(digest.as_str()))
            {
                self.store.attach_record_device(record.id, device.id)?;
                return Ok(FetchOutcome::NotUpdated);
            }
            if !existing.is_empty() {
                self.store.delete_app_artifacts(app.id)?;
            }
            app.released_at = Some(Utc::now());
            self.store.update_app(app)?;
            app.version_code.unwrap_or(1)
        };

        let (record, created) = self.store.get_or_create_record(app.id, version_code)?;
        self.store.attach_record_device(record.id, device.id)?;
        if !created {
            return Ok(FetchOutcome::NotUpdated);
        }

        let path = artifact_path(app, version_code, &extension);
        if self.blob.exists(&path)? {
            self.blob.delete(&path)?;
        }
        self.blob.write(&path, &data)?;

        let mut updated = record.clone();
        updated.size_bytes = data.len() as i64;
        updated.checksum = Some(digest);
        updated.signature = Some(self.signer.signature(&data));
        updated.installable = is_installable_name(file_name, self.non_installable);
        updated.blob_path = Some(path);
        self.store.update_record_binary(&updated)?;

        log.info(format!(
            "{}: stored {} (code {version_code}) from direct url",
            app.name, file_name
        ));
        Ok(FetchOutcome::Updated)
    }

    fn download_bounded(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let mut resp = self.http.get(url).send()?.error_for_status()?;

        let mut hasher = Sha256::new();
        let mut data = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = resp.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            data.extend_from_slice(&buf[..n]);
            if data.len() > DIRECT_DOWNLOAD_LIMIT {
                return Err(Error::DownloadTooLarge {
                    limit: DIRECT_DOWNLOAD_LIMIT,
                });
            }
        }

        Ok((data, hex::encode(hasher.finalize())))
    }
}
