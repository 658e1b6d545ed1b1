use crate::AppRelay;
use crate::error::Result;
use crate::requests::ChatProcessRequest;
use crate::tools::{create_event_frame, error_body, with_public_headers};
use async_stream::stream;
use bytes::Bytes;
use chat_relay::{ChatRelay, ChatService, DailyUsage};
use common::data::ChatRequest;
use common::stream::StreamEvent;
use futures_util::{Stream, pin_mut};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{Sender, channel};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{debug, info, warn};
use volo_http::{
    response::Response,
    server::{
        IntoResponse,
        extract::Json,
        response::sse::{Event, Sse},
        route::{Router, post},
    },
    utils::Extension,
};

/// Events buffered between the relay task and a slow client.
const EVENT_BUFFER: usize = 16;

type Rejection = (StatusCode, Value);

/// Parses the body and runs the request guard. Every failure is a 400 with
/// a machine readable `code`.
async fn admit<P, U, D>(relay: &ChatRelay<P, U, D>, body: &[u8]) -> std::result::Result<ChatRequest, Rejection>
where
    D: DailyUsage,
{
    let request = match ChatProcessRequest::parse(body) {
        Ok(req) => req.into_chat_request(),
        Err(err) => {
            warn!(error = %err, "rejecting chat request");
            return Err((StatusCode::BAD_REQUEST, error_body("malformed_body", err.to_string())));
        }
    };
    debug!(req = ?request);

    if let Err(err) = relay.check_request(&request).await {
        info!(user_id = request.user_id, code = err.code(), "chat request blocked");
        return Err((StatusCode::BAD_REQUEST, error_body(err.code(), err.to_string())));
    }
    Ok(request)
}

async fn chat_process_handler(Extension(relay): Extension<Arc<AppRelay>>, body: Bytes) -> Response {
    let request = match admit(relay.as_ref(), &body).await {
        Ok(request) => request,
        Err((status, body)) => return with_public_headers((status, Json(body)).into_response()),
    };

    let (tx, rx) = channel(EVENT_BUFFER);
    let user_id = request.user_id;
    tokio::spawn(async move {
        forward_events(relay.chat_process(request), tx).await;
        debug!(user_id, "chat relay task finished");
    });
    with_public_headers(create_sse_response(ReceiverStream::new(rx)).into_response())
}

/// Pulls the relay until it ends or the client goes away. Returning drops
/// the relay stream and with it the upstream connection.
async fn forward_events<S>(events: S, tx: Sender<StreamEvent>)
where
    S: Stream<Item = StreamEvent>,
{
    pin_mut!(events);
    loop {
        tokio::select! {
            _ = tx.closed() => {
                info!("client disconnected, cancelling upstream");
                return;
            }
            next = events.next() => match next {
                Some(event) => {
                    if tx.send(event).await.is_err() {
                        info!("client disconnected, cancelling upstream");
                        return;
                    }
                }
                None => return,
            },
        }
    }
}

fn create_sse_response<S>(input: S) -> Sse<impl Stream<Item = Result<Event>>>
where
    S: Stream<Item = StreamEvent> + Send + Sync + 'static,
{
    let stream = stream! {
        pin_mut!(input);
        while let Some(event) = input.next().await {
            yield Ok(Event::new().data(create_event_frame(&event)));
        }
    };
    Sse::new(stream)
}

pub fn chat_process_router() -> Router {
    Router::new().route("/openai/chat-process", post(chat_process_handler))
}
