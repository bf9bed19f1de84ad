use crate::error::Result;

/// Fire-and-forget summary transport. The real mail sender is owned by the
/// surrounding system; this crate only composes and hands off the message.
pub trait Notifier: Send + Sync {
    fn send(&self, subject: &str, body: &str, from: &str, to: &[String]) -> Result<()>;
}

/// Default transport: the summary goes to the process log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, subject: &str, body: &str, from: &str, to: &[String]) -> Result<()> {
        tracing::info!(
            subject,
            from,
            recipients = to.join(", "),
            "run summary:\n{body}"
        );
        Ok(())
    }
}
