use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outbound channel to the operator
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Fire-and-forget handle for operator notifications
///
/// Messages go through a bounded queue drained by one background task.
/// A full queue drops the message; a slow sink never blocks the caller.
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<String>>,
}

impl Notifier {
    /// Spawn the delivery task
    ///
    /// # Arguments
    /// * `capacity` - Queue length before messages are dropped
    /// * `send_timeout` - Upper bound for one delivery attempt
    pub fn spawn(
        sink: Arc<dyn NotificationSink>,
        capacity: usize,
        send_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                match tokio::time::timeout(send_timeout, sink.send(&text)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!("Failed to send notification: {}", e),
                    Err(_) => tracing::warn!(
                        "Notification timed out after {:?}, dropped",
                        send_timeout
                    ),
                }
            }
            tracing::debug!("Notifier queue closed");
        });

        (Self { tx: Some(tx) }, handle)
    }

    /// Log-only notifier, used when no sink is configured
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn notify(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("📣 {}", text);

        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(e) = tx.try_send(text) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("Notification queue full, message dropped")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!("Notification worker stopped, message dropped")
                }
            }
        }
    }
}
