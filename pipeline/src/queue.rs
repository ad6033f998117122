use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Maximum number of messages returned by one poll.
pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: String,
    pub receipt_handle: String,
}

/// At-least-once message queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn send(&self, body: &str) -> Result<()>;

    /// Poll without waiting. Returns at most `max_messages` messages.
    async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>>;

    async fn delete(&self, receipt_handle: &str) -> Result<()>;
}

/// Why a drain stopped polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    EmptyPage,
    /// A page came back with fewer than [`PAGE_SIZE`] messages. Messages sent
    /// after that poll are left for the next invocation.
    ShortPage(usize),
    /// Polling failed after messages had already been deleted. What was
    /// collected up to that point is still returned.
    Interrupted,
}

#[derive(Debug)]
pub struct Drained<T> {
    pub items: Vec<T>,
    /// Messages whose body did not parse. They are left on the queue.
    pub rejected: usize,
    pub ended_by: DrainEnd,
}

/// Poll the queue until an empty or short page and parse each body as JSON.
///
/// Every page is parsed in full before any of its messages is deleted, and
/// only messages that parsed are deleted. A malformed body is logged, counted
/// in [`Drained::rejected`] and left for redelivery. Once anything has been
/// deleted the collected items are always returned: a failed delete keeps the
/// item (it will be delivered again) and a failed poll ends the drain with
/// [`DrainEnd::Interrupted`].
pub async fn drain<T, Q>(queue: &Q) -> Result<Drained<T>>
where
    T: DeserializeOwned + Send,
    Q: EventQueue + ?Sized,
{
    let mut items = Vec::new();
    let mut rejected = 0usize;
    let mut deleted = 0usize;
    let mut pages = 0usize;

    let ended_by = loop {
        let page = match queue.receive(PAGE_SIZE).await {
            Ok(page) => page,
            Err(e) if deleted == 0 => return Err(e),
            Err(e) => {
                error!(
                    "Polling failed after {} messages were deleted, returning what was collected: {}",
                    deleted, e
                );
                break DrainEnd::Interrupted;
            }
        };
        pages += 1;

        if page.is_empty() {
            break DrainEnd::EmptyPage;
        }

        let page_len = page.len();
        let mut parsed = Vec::with_capacity(page_len);
        for message in page {
            match serde_json::from_str::<T>(&message.body) {
                Ok(item) => parsed.push((item, message.receipt_handle)),
                Err(e) => {
                    rejected += 1;
                    error!(
                        "Leaving malformed message {} on the queue: {}",
                        message.receipt_handle, e
                    );
                }
            }
        }

        for (item, receipt_handle) in parsed {
            match queue.delete(&receipt_handle).await {
                Ok(()) => deleted += 1,
                Err(e) => error!(
                    "Could not delete message {}, it will be delivered again: {}",
                    receipt_handle, e
                ),
            }
            items.push(item);
        }

        if page_len < PAGE_SIZE {
            break DrainEnd::ShortPage(page_len);
        }
    };

    debug!("Drain finished after {} polls: {:?}", pages, ended_by);
    if let DrainEnd::ShortPage(_) = ended_by {
        info!(
            "Stopped draining on a short page with {} messages collected; later arrivals wait for the next run",
            items.len()
        );
    }
    if rejected > 0 {
        warn!("{} malformed messages were left on the queue", rejected);
    }

    Ok(Drained {
        items,
        rejected,
        ended_by,
    })
}

/// A message without a body still occupies its slot in the page, so it is
/// kept with an empty body and fails to parse downstream. A message without a
/// receipt handle can never be deleted and is an error.
fn queue_message(
    message_id: Option<&str>,
    body: Option<&str>,
    receipt_handle: Option<&str>,
) -> Result<QueueMessage> {
    let receipt_handle = receipt_handle.ok_or_else(|| {
        Error::Queue(format!(
            "message {:?} arrived without a receipt handle",
            message_id
        ))
    })?;

    Ok(QueueMessage {
        body: body.unwrap_or_default().to_string(),
        receipt_handle: receipt_handle.to_string(),
    })
}

pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl EventQueue for SqsQueue {
    async fn send(&self, body: &str) -> Result<()> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| Error::Queue(format!("failed to enqueue message: {}", e)))?;

        Ok(())
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.min(PAGE_SIZE) as i32)
            .wait_time_seconds(0)
            .send()
            .await
            .map_err(|e| Error::Queue(format!("failed to receive messages: {}", e)))?;

        output
            .messages()
            .iter()
            .map(|m| queue_message(m.message_id(), m.body(), m.receipt_handle()))
            .collect()
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| Error::Queue(format!("failed to delete message: {}", e)))?;

        Ok(())
    }
}

/// Process-local queue for tests and local runs. Received messages stay
/// in flight until deleted; they are not redelivered.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<InMemoryQueueState>,
}

#[derive(Debug, Default)]
struct InMemoryQueueState {
    pending: VecDeque<String>,
    in_flight: Vec<QueueMessage>,
    next_receipt: u64,
    deletes: usize,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<String> {
        self.lock().pending.iter().cloned().collect()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryQueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventQueue for InMemoryQueue {
    async fn send(&self, body: &str) -> Result<()> {
        self.lock().pending.push_back(body.to_string());
        Ok(())
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>> {
        let mut state = self.lock();
        let take = max_messages.min(PAGE_SIZE).min(state.pending.len());

        let mut page = Vec::with_capacity(take);
        for _ in 0..take {
            let Some(body) = state.pending.pop_front() else {
                break;
            };
            state.next_receipt += 1;
            let message = QueueMessage {
                body,
                receipt_handle: format!("receipt-{}", state.next_receipt),
            };
            state.in_flight.push(message.clone());
            page.push(message);
        }

        Ok(page)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        let mut state = self.lock();
        let before = state.in_flight.len();
        state.in_flight.retain(|m| m.receipt_handle != receipt_handle);
        if state.in_flight.len() == before {
            return Err(Error::Queue(format!(
                "unknown receipt handle {}",
                receipt_handle
            )));
        }
        state.deletes += 1;
        Ok(())
    }
}
