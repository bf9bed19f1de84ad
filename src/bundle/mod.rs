use std::io::{Read, Seek, SeekFrom, Write};

use tempfile::SpooledTempFile;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::blob::BlobStore;
use crate::error::Result;
use crate::fetch::artifact_path;
use crate::run::RunLog;
use crate::signer::ArtifactSigner;
use crate::splits;
use crate::store::Store;
use crate::types::{ArtifactRecord, TrackedApp, is_installable_name};

/// Archives stay in memory up to this size, then spill to disk. Bundles can
/// approach ~100 MB with full native-library splits.
const SPOOL_THRESHOLD: usize = 32 * 1024 * 1024;

/// Assembles base+splits bundles for updated bundled apps after the device
/// loop finishes.
pub struct Bundler<'a> {
    pub store: &'a dyn Store,
    pub blob: &'a dyn BlobStore,
    pub signer: &'a ArtifactSigner,
    pub non_installable: &'a [String],
}

impl Bundler<'_> {
    /// Streams one record's base binary plus its resolved splits into a
    /// single deflate ZIP and publishes it onto the record. A split that
    /// cannot be read is skipped with an error line; the bundle ships
    /// without it.
    pub fn bundle_record(
        &self,
        app: &TrackedApp,
        record: &ArtifactRecord,
        log: &mut RunLog,
    ) -> Result<()> {
        // Only raw base APKs need bundling; finished bundles and empty
        // records are left alone.
        if !record.is_raw_apk() {
            return Ok(());
        }
        let base_path = record.blob_path.clone().unwrap_or_default();
        let base_name = record.file_name().unwrap_or("base.apk").to_string();

        let base = self.blob.read(&base_path)?;
        let resolved = splits::resolve(&self.store.list_record_splits(record.id)?);

        let mut spool = SpooledTempFile::new(SPOOL_THRESHOLD);
        let mut bundled = 0usize;
        {
            let mut archive = ZipWriter::new(&mut spool);
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

            archive.start_file(base_name.as_str(), options)?;
            archive.write_all(&base)?;

            for split in &resolved {
                let bytes = match self.blob.read(&split.blob_path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log.error(format!(
                            "{}: skipping split {} in bundle for code {}: {e}",
                            app.name, split.name, record.version_code
                        ));
                        continue;
                    }
                };
                archive.start_file(split.file_name(), options)?;
                archive.write_all(&bytes)?;
                bundled += 1;
            }

            archive.finish()?;
        }

        let mut bundle = Vec::new();
        spool.seek(SeekFrom::Start(0))?;
        spool.read_to_end(&mut bundle)?;

        let target = artifact_path(app, record.version_code, "zip");
        if self.blob.exists(&target)? {
            self.blob.delete(&target)?;
        }
        self.blob.write(&target, &bundle)?;

        // The raw base is superseded; exactly one physical file remains per
        // version code.
        if base_path != target {
            self.blob.delete(&base_path)?;
        }

        let file_name = target.rsplit('/').next().unwrap_or(&target).to_string();
        let mut updated = record.clone();
        updated.size_bytes = bundle.len() as i64;
        updated.checksum = Some(self.signer.checksum(&bundle));
        updated.signature = Some(self.signer.signature(&bundle));
        updated.installable = is_installable_name(&file_name, self.non_installable);
        updated.blob_path = Some(target);
        self.store.update_record_binary(&updated)?;

        log.info(format!(
            "{}: bundled version code {} ({} splits)",
            app.name, record.version_code, bundled
        ));
        Ok(())
    }
}
