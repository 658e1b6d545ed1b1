use common::data::{ChatLogRecord, ChatRequest, ChatResult};
use faststr::FastStr;
use std::fmt::Display;
use storage::Storage;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Debits a member's package for one answered chat.
pub trait BillingLedger: Send + Sync + 'static {
    type Error: Display + Send;

    fn consume(&self, user_id: i64) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Persists the full exchange for auditing.
pub trait ChatLogStore: Send + Sync + 'static {
    type Error: Display + Send;

    fn record(&self, record: ChatLogRecord) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<C: Send + Sync + 'static> BillingLedger for Storage<C> {
    type Error = storage::error::Error;

    async fn consume(&self, user_id: i64) -> Result<(), Self::Error> {
        self.record_consumption(user_id).await
    }
}

impl<C: Send + Sync + 'static> ChatLogStore for Storage<C> {
    type Error = storage::error::Error;

    async fn record(&self, record: ChatLogRecord) -> Result<(), Self::Error> {
        self.record_chat_log(&record).await
    }
}

/// Fire-and-forget side effects of a successful chat.
///
/// Billing and logging go through separate queues drained by their own
/// workers, so a failure in one never affects the other, and neither can
/// reach the chat response already streamed to the user.
#[derive(Clone)]
pub struct Dispatcher {
    billing_tx: UnboundedSender<i64>,
    log_tx:     UnboundedSender<ChatLogRecord>,
}

/// Handles of the queue workers. They exit once every `Dispatcher` clone is
/// dropped and the queues are drained.
pub struct DispatchWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl DispatchWorkers {
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatch worker panicked");
            }
        }
    }
}

impl Dispatcher {
    pub fn spawn<L, G>(ledger: L, logs: G) -> (Self, DispatchWorkers)
    where
        L: BillingLedger,
        G: ChatLogStore,
    {
        let (billing_tx, billing_rx) = unbounded_channel();
        let (log_tx, log_rx) = unbounded_channel();
        let handles = vec![
            tokio::spawn(billing_worker(ledger, billing_rx)),
            tokio::spawn(log_worker(logs, log_rx)),
        ];
        (Self { billing_tx, log_tx }, DispatchWorkers { handles })
    }

    /// Enqueues both side effects. Must be called once per `Done`, never
    /// after an `Error`.
    pub fn dispatch(&self, request: &ChatRequest, result: &ChatResult, model: &FastStr) {
        debug!(user_id = request.user_id, message_id = %result.message_id, "dispatching post-completion jobs");
        if self.billing_tx.send(request.user_id).is_err() {
            error!(user_id = request.user_id, "billing queue closed, consumption not recorded");
        }
        let record = ChatLogRecord::new(request, result, model);
        if self.log_tx.send(record).is_err() {
            error!(
                user_id = request.user_id,
                message_id = %result.message_id,
                "chat log queue closed, exchange not recorded"
            );
        }
    }
}

async fn billing_worker<L: BillingLedger>(ledger: L, mut rx: UnboundedReceiver<i64>) {
    while let Some(user_id) = rx.recv().await {
        match ledger.consume(user_id).await {
            Ok(()) => debug!(user_id, "consumption recorded"),
            Err(e) => error!(user_id, error = %e, "failed to record consumption"),
        }
    }
    info!("billing worker stopped");
}

async fn log_worker<G: ChatLogStore>(logs: G, mut rx: UnboundedReceiver<ChatLogRecord>) {
    while let Some(record) = rx.recv().await {
        let user_id = record.user_id;
        let message_id = record.message_id.clone();
        match logs.record(record).await {
            Ok(()) => debug!(user_id, message_id = %message_id, "chat log recorded"),
            Err(e) => error!(user_id, message_id = %message_id, error = %e, "failed to record chat log"),
        }
    }
    info!("chat log worker stopped");
}
