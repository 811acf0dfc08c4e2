use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;

use crate::mailer::{Mailer, Notification};

/// Welcome email for a freshly inserted record. Detached from the write
/// path: delivery failure is logged and dropped, never propagated.
pub fn notify_created(mailer: Arc<dyn Mailer>, email: String) -> JoinHandle<()> {
    deliver(mailer, Notification::Welcome { email })
}

/// Password-reset email carrying the recovery code set by the update.
pub fn notify_recovery(mailer: Arc<dyn Mailer>, email: String, code: String) -> JoinHandle<()> {
    deliver(mailer, Notification::PasswordReset { email, code })
}

fn deliver(mailer: Arc<dyn Mailer>, message: Notification) -> JoinHandle<()> {
    tokio::spawn(async move {
        let to = message.recipient().to_string();
        if let Err(e) = mailer.send(message).await {
            error!(error = %e, %to, "notification delivery failed");
        }
    })
}
