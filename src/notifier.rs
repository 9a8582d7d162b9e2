// Notification collaborator
//
// Fire-and-forget: settlements call notify after they commit, never before,
// and a delivery failure is logged and dropped. Transport (websocket push,
// queue, email) lives outside this crate.

use async_trait::async_trait;
use tracing::info;

use crate::error::EngineError;
use crate::models::AccountId;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        account_id: AccountId,
        kind: &str,
        title: &str,
        message: &str,
    ) -> Result<(), EngineError>;
}

/// Default notifier: writes the notification to the log and succeeds.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        account_id: AccountId,
        kind: &str,
        title: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        info!(account = account_id, kind, title, message, "notification");
        Ok(())
    }
}
