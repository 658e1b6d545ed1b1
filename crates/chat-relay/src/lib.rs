mod dispatch;
mod guard;
mod history;
mod provider;
mod relay;

use async_stream::stream;
use common::data::ChatRequest;
use common::error::Error;
use common::messages::Message;
use common::proxy::Upstream;
use common::stream::StreamEvent;
use futures_util::{Stream, StreamExt, pin_mut};
use std::sync::Arc;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

pub use dispatch::{BillingLedger, ChatLogStore, DispatchWorkers, Dispatcher};
pub use guard::{DailyUsage, GuardError, RequestGuard};
pub use history::{History, assemble_messages};
pub use provider::{ConfigProvider, SettingsConfigProvider, SettingsSource};
pub use relay::{ChatResultBuilder, generate_completion_id, relay};

pub trait ChatService {
    /// Streams the answer to one chat message. Every stream ends with
    /// exactly one `Done` or `Error`; side effects run only after `Done`.
    fn chat_process(
        self: Arc<Self>,
        request: ChatRequest,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static;
}

pub struct ChatRelay<P, U, D = ()> {
    provider:   P,
    upstream:   U,
    usage:      D,
    history:    History,
    dispatcher: Dispatcher,
    guard:      RequestGuard,
}

impl<P, U> ChatRelay<P, U> {
    pub fn new(provider: P, upstream: U, dispatcher: Dispatcher, guard: RequestGuard) -> Self {
        Self {
            provider,
            upstream,
            usage: (),
            history: History::default(),
            dispatcher,
            guard,
        }
    }
}

impl<P, U, D> ChatRelay<P, U, D> {
    /// Counts chats against the daily limit with `usage`.
    pub fn with_daily_usage<E>(self, usage: E) -> ChatRelay<P, U, E> {
        ChatRelay {
            provider: self.provider,
            upstream: self.upstream,
            usage,
            history: self.history,
            dispatcher: self.dispatcher,
            guard: self.guard,
        }
    }
}

impl<P, U, D: DailyUsage> ChatRelay<P, U, D> {
    /// Checks the prompt and the member's daily quota before any upstream
    /// work starts.
    pub async fn check_request(&self, request: &ChatRequest) -> Result<(), GuardError> {
        self.guard.check(&request.message)?;
        self.guard.check_daily(request.user_id, &self.usage).await
    }
}

impl<P, U, D> ChatService for ChatRelay<P, U, D>
where
    P: ConfigProvider,
    U: Upstream + 'static,
    D: DailyUsage,
{
    fn chat_process(
        self: Arc<Self>,
        request: ChatRequest,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        stream! {
            let config = match self.provider.resolve(request.channel.as_deref()).await {
                Ok(config) => config.with_model(request.model.clone()),
                Err(e) => {
                    error!(user_id = request.user_id, error = %e, "failed to resolve channel config");
                    yield StreamEvent::error(e.to_string());
                    return;
                }
            };
            info!(
                user_id = request.user_id,
                channel = %config.channel,
                model = %config.model,
                conversation_id = ?request.conversation_id,
                "chat process started"
            );

            let deadline = Instant::now() + config.timeout;
            let conversation = match request.conversation_id.as_deref() {
                Some(id) => self.history.load(id).await,
                None => None,
            };
            let prompt = Message::user(request.message.clone());
            let messages = assemble_messages(&config, conversation.as_ref(), &prompt);

            let chunks = match timeout_at(deadline, self.upstream.stream_chat_completion(&config, messages)).await {
                Ok(Ok(chunks)) => chunks,
                Ok(Err(e)) => {
                    error!(user_id = request.user_id, error = %e, "upstream request failed");
                    yield StreamEvent::error(e.to_string());
                    return;
                }
                Err(_) => {
                    error!(user_id = request.user_id, timeout = ?config.timeout, "upstream did not answer in time");
                    yield StreamEvent::error(Error::UpstreamTimeout(config.timeout).to_string());
                    return;
                }
            };

            let mut builder = ChatResultBuilder::new(&request, conversation.as_ref());
            let events = relay(chunks, deadline);
            pin_mut!(events);

            let mut terminal = None;
            while let Some(event) = events.next().await {
                if event.is_terminal() {
                    terminal = Some(event);
                    break;
                }
                builder.push(&event);
                yield event;
            }

            match terminal {
                Some(StreamEvent::Done { final_id }) => {
                    let result = builder.finish(final_id.clone());
                    info!(
                        user_id = request.user_id,
                        message_id = %result.message_id,
                        chars = result.text.chars().count(),
                        "chat process completed"
                    );
                    self.history.store(conversation, &prompt, &result).await;
                    self.dispatcher.dispatch(&request, &result, &config.model);
                    yield StreamEvent::Done { final_id };
                }
                Some(event) => {
                    warn!(user_id = request.user_id, error = %event, "chat process ended with error");
                    yield event;
                }
                None => {
                    yield StreamEvent::error("upstream stream ended unexpectedly");
                }
            }
        }
    }
}
