use std::collections::BTreeSet;
use std::time::Duration;

use crate::blob::BlobStore;
use crate::bundle::Bundler;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::market::{MarketAccount, MarketApi};
use crate::notify::Notifier;
use crate::session::SessionManager;
use crate::signer::ArtifactSigner;
use crate::store::Store;
use crate::types::TrackedApp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

/// Run-scoped message log. Every component appends here and the publisher
/// turns the whole thing into the summary body; nothing outlives the run.
#[derive(Debug, Default)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.entries.push(LogEntry {
            severity: Severity::Info,
            message,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.entries.push(LogEntry {
            severity: Severity::Error,
            message,
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count()
    }

    /// Renders the log for the summary notification.
    #[must_use]
    pub fn body(&self) -> String {
        self.entries
            .iter()
            .map(|e| match e.severity {
                Severity::Info => format!("INFO  {}", e.message),
                Severity::Error => format!("ERROR {}", e.message),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub updated_apps: Vec<String>,
    pub devices_processed: usize,
    pub devices_skipped: usize,
    pub log: RunLog,
}

/// One update pass: device loop, bundling, then the summary notification.
/// Nothing inside a pass is fatal by design; partial progress must never
/// block future runs.
pub struct Updater<'a> {
    pub store: &'a dyn Store,
    pub blob: &'a dyn BlobStore,
    pub market: &'a dyn MarketApi,
    pub signer: &'a ArtifactSigner,
    pub notifier: &'a dyn Notifier,
    pub config: &'a Config,
}

impl Updater<'_> {
    pub fn run(&self) -> Result<RunSummary> {
        let mut log = RunLog::new();
        let mut updated: BTreeSet<String> = BTreeSet::new();

        let devices = self.store.list_completed_devices()?;
        let mut apps = self.store.list_auto_update_apps(&self.config.platform)?;
        log.info(format!(
            "starting update pass: {} device(s), {} app(s)",
            devices.len(),
            apps.len()
        ));

        let account = MarketAccount {
            username: self.config.market.username.clone(),
            password: self.config.market.password.clone(),
        };
        let manager = SessionManager::new(self.market, self.store, &account);
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let fetcher = Fetcher {
            store: self.store,
            blob: self.blob,
            market: self.market,
            signer: self.signer,
            http: &http,
            store_host: &self.config.market.web_host,
            non_installable: &self.config.non_installable_extensions,
        };

        let mut processed = 0;
        let mut skipped = 0;
        for device in &devices {
            let session = match manager.login(device, &mut log) {
                Ok(session) => session,
                Err(e) => {
                    log.error(format!("{}: skipping device: {e}", device.codename));
                    skipped += 1;
                    continue;
                }
            };

            for app in apps.iter_mut() {
                let outcome = fetcher.fetch_app(app, session.market_session(), device, &mut log);
                if outcome.is_updated() {
                    updated.insert(app.name.clone());
                }
            }

            // Session teardown clears the cached token before the next device.
            drop(session);
            processed += 1;

            if self.config.device_delay_secs > 0 {
                std::thread::sleep(Duration::from_secs(self.config.device_delay_secs));
            }
        }

        self.bundle_pass(&apps, &updated, &mut log);
        self.publish(&updated, &mut log);

        Ok(RunSummary {
            updated_apps: updated.into_iter().collect(),
            devices_processed: processed,
            devices_skipped: skipped,
            log,
        })
    }

    fn bundle_pass(&self, apps: &[TrackedApp], updated: &BTreeSet<String>, log: &mut RunLog) {
        let bundler = Bundler {
            store: self.store,
            blob: self.blob,
            signer: self.signer,
            non_installable: &self.config.non_installable_extensions,
        };

        for app in apps {
            if !app.is_bundled || !updated.contains(&app.name) {
                continue;
            }
            let records = match self.store.list_records(app.id) {
                Ok(records) => records,
                Err(e) => {
                    log.error(format!("{}: cannot list records for bundling: {e}", app.name));
                    continue;
                }
            };
            for record in records {
                if let Err(e) = bundler.bundle_record(app, &record, log) {
                    log.error(format!(
                        "{}: bundling failed for code {}: {e}",
                        app.name, record.version_code
                    ));
                }
            }
        }
    }

    fn publish(&self, updated: &BTreeSet<String>, log: &mut RunLog) {
        let recipients = &self.config.notify.recipients;
        if recipients.is_empty() {
            log.error("no notification recipients configured; summary not sent");
            return;
        }

        let subject = format!("app updater: {} application(s) updated", updated.len());
        let mut body = String::new();
        if updated.is_empty() {
            body.push_str("No applications were updated.\n");
        } else {
            body.push_str("Updated applications:\n");
            for name in updated {
                body.push_str("  - ");
                body.push_str(name);
                body.push('\n');
            }
        }
        body.push_str("\nRun log:\n");
        body.push_str(&log.body());

        if let Err(e) = self
            .notifier
            .send(&subject, &body, &self.config.notify.from, recipients)
        {
            log.error(format!("failed to send summary notification: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_body_and_counts() {
        let mut log = RunLog::new();
        log.info("stored version 2.1");
        log.error("split write failed");

        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.error_count(), 1);

        let body = log.body();
        assert!(body.contains("INFO  stored version 2.1"));
        assert!(body.contains("ERROR split write failed"));
    }
}
