use chrono::Utc;

use super::{FetchOutcome, Fetcher, artifact_path};
use crate::error::Result;
use crate::market::{AppDetails, DeliveredFile, MarketError, MarketSession};
use crate::run::RunLog;
use crate::splits;
use crate::types::{ArtifactRecord, DeviceProfile, NewSplit, TrackedApp, is_installable_name};

impl Fetcher<'_> {
    /// Store-backed acquisition: details lookup, version bookkeeping, then
    /// delivery of base and splits.
    pub(super) fn fetch_from_market(
        &self,
        app: &mut TrackedApp,
        session: &MarketSession,
        device: &DeviceProfile,
        log: &mut RunLog,
    ) -> FetchOutcome {
        let details = match self.market.details(session, &app.package_id) {
            Ok(details) => details,
            Err(MarketError::Incompatible(reason)) => {
                log.error(format!(
                    "{}: not compatible with device {}: {reason}",
                    app.name, device.codename
                ));
                return FetchOutcome::IncompatibleDevice;
            }
            Err(e) => {
                log.error(format!(
                    "{}: detail lookup failed on {}: {e}",
                    app.name, device.codename
                ));
                return FetchOutcome::Failed(e.to_string());
            }
        };

        match self.apply_market_details(app, session, device, &details, log) {
            Ok(outcome) => outcome,
            Err(e) => {
                log.error(format!(
                    "{}: update failed on {}: {e}",
                    app.name, device.codename
                ));
                FetchOutcome::Failed(e.to_string())
            }
        }
    }

    fn apply_market_details(
        &self,
        app: &mut TrackedApp,
        session: &MarketSession,
        device: &DeviceProfile,
        details: &AppDetails,
        log: &mut RunLog,
    ) -> Result<FetchOutcome> {
        if app.version_name.as_deref() != Some(details.version_name.as_str()) {
            // A changed version string invalidates every stored code for the
            // app; codes must never outlive the version they were seen under.
            self.store.delete_app_artifacts(app.id)?;
            app.version_name = Some(details.version_name.clone());
            app.released_at = details.upload_date.or(Some(Utc::now()));
        }
        app.version_code = Some(details.version_code);
        if !details.permissions.is_empty() {
            app.permissions = Some(details.permissions.join("\n"));
        }
        self.store.update_app(app)?;

        let (record, created) = self
            .store
            .get_or_create_record(app.id, details.version_code)?;
        self.store.attach_record_device(record.id, device.id)?;

        // A known code is up to date, unless this is a bundled app whose
        // stored artifact is still a raw single APK: another device may yet
        // contribute splits this one's profile unlocked.
        if !created && (!app.is_bundled || record.is_bundle()) {
            return Ok(FetchOutcome::NotUpdated);
        }

        let delivery =
            self.market
                .delivery(session, &app.package_id, details.version_code, details.offer_type)?;

        let mut new_splits = false;
        if !delivery.splits.is_empty() {
            if !app.is_bundled {
                app.is_bundled = true;
                self.store.update_app(app)?;
            }
            for split in &delivery.splits {
                match self.store_split(app, &record, device, split) {
                    Ok(split_created) => new_splits |= split_created,
                    Err(e) => log.error(format!(
                        "{}: failed to store split {}: {e}",
                        app.name, split.name
                    )),
                }
            }
        }

        if created || !app.is_bundled {
            self.write_base(app, &record, &delivery.base)?;
            log.info(format!(
                "{}: stored version {} (code {}) from {}",
                app.name, details.version_name, details.version_code, device.codename
            ));
            return Ok(FetchOutcome::Updated);
        }

        if new_splits {
            log.info(format!(
                "{}: collected new splits for code {} from {}",
                app.name, details.version_code, device.codename
            ));
            return Ok(FetchOutcome::Updated);
        }

        Ok(FetchOutcome::NotUpdated)
    }

    fn store_split(
        &self,
        app: &TrackedApp,
        record: &ArtifactRecord,
        device: &DeviceProfile,
        file: &DeliveredFile,
    ) -> Result<bool> {
        let name = splits::synthetic_name(&file.name, file.total_size);
        let blob_path = format!(
            "splits/{}-{}-{}.apk",
            super::slug(&app.name),
            record.version_code,
            name
        );

        let (split, created) = self.store.get_or_create_split(&NewSplit {
            app_id: app.id,
            record_id: record.id,
            name,
            blob_path,
            size_bytes: file.total_size,
        })?;

        // A known split that survived an interrupted run may be missing from
        // storage; re-write it, otherwise leave the stored copy alone.
        if created || !self.blob.exists(&split.blob_path)? {
            self.blob.write(&split.blob_path, &file.data)?;
        }
        self.store.attach_split_device(split.id, device.id)?;

        Ok(created)
    }

    /// Writes the base binary onto the record. Checksum and signature are
    /// computed only for final artifacts; a bundled app's base APK is an
    /// intermediate and gets signed as part of the bundle.
    fn write_base(
        &self,
        app: &TrackedApp,
        record: &ArtifactRecord,
        base: &DeliveredFile,
    ) -> Result<()> {
        let extension = base
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "apk".to_string());
        let path = artifact_path(app, record.version_code, &extension);

        if self.blob.exists(&path)? {
            self.blob.delete(&path)?;
        }
        self.blob.write(&path, &base.data)?;

        let mut updated = record.clone();
        updated.size_bytes = base.data.len() as i64;
        updated.installable = is_installable_name(
            path.rsplit('/').next().unwrap_or(&path),
            self.non_installable,
        );
        if app.is_bundled {
            updated.checksum = None;
            updated.signature = None;
        } else {
            updated.checksum = Some(self.signer.checksum(&base.data));
            updated.signature = Some(self.signer.signature(&base.data));
        }
        updated.blob_path = Some(path);
        self.store.update_record_binary(&updated)?;

        Ok(())
    }
}
