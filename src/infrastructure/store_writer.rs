use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{DurableStore, StoreRecord};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum WriteCommand {
    Put(StoreRecord),
    Flush(oneshot::Sender<()>),
}

/// Queues durable writes onto a single worker so they land in mutation order.
/// A failed write is logged and dropped; the next mutation rewrites the state.
#[derive(Debug, Clone)]
pub struct StoreWriter {
    sender: mpsc::UnboundedSender<WriteCommand>,
}

impl StoreWriter {
    pub fn spawn(store: Arc<dyn DurableStore>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<WriteCommand>();
        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    WriteCommand::Put(record) => {
                        let keys = record.keys().cloned().collect::<Vec<_>>().join(",");
                        match store.set(record).await {
                            Ok(()) => debug!(keys = %keys, "durable write applied"),
                            Err(error) => warn!(keys = %keys, %error, "durable write failed"),
                        }
                    }
                    WriteCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("store writer stopped");
        });
        Self { sender }
    }

    pub fn queue(&self, record: StoreRecord) {
        if self.sender.send(WriteCommand::Put(record)).is_err() {
            warn!("store writer is closed; write dropped");
        }
    }

    pub fn queue_value(&self, key: &str, value: Value) {
        let mut record = StoreRecord::new();
        record.insert(key.to_string(), value);
        self.queue(record);
    }

    /// Resolves once every write queued before this call has been attempted.
    pub async fn flush(&self) -> Result<(), InfraError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(WriteCommand::Flush(ack))
            .map_err(|_| InfraError::Storage("store writer is closed".to_string()))?;
        done.await
            .map_err(|_| InfraError::Storage("store writer stopped before flush".to_string()))
    }
}
