use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use common::stream::StreamEvent;
use faststr::FastStr;
use reqwest::Client as ReqwestClient;
use reqwest::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;
use volo_http::response::Response;

/// Shown to the user in front of every upstream failure.
pub const ERROR_TEXT_PREFIX: &str = "抱歉，AI服务暂时不可用，请稍后重试。错误信息：";

pub(crate) const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[inline]
pub fn build_http_client() -> Result<ReqwestClient> {
    let builder = ReqwestClient::builder();
    let timeout = 10;
    let client = builder
        .connect_timeout(Duration::from_secs(timeout))
        .build()
        .map_err(|_| Error::FailedToBuildClient)?;
    Ok(client)
}

#[inline]
pub fn create_event_frame(event: &StreamEvent) -> FastStr {
    build_event_json(event, Local::now()).to_string().into()
}

/// `{id, text, dateTime}` plus `done: true` on the final frame or
/// `error: true` on a failure frame.
fn build_event_json(event: &StreamEvent, now: DateTime<Local>) -> Value {
    let ts = now.timestamp_millis();
    let date_time = now.format(DATE_TIME_FORMAT).to_string();
    match event {
        StreamEvent::Delta { id, text } => {
            let id = id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| format!("msg_{ts}"));
            json!({ "id": id, "text": text, "dateTime": date_time })
        }
        StreamEvent::Done { .. } => json!({
            "id": format!("complete_{ts}"),
            "text": "",
            "dateTime": date_time,
            "done": true,
        }),
        StreamEvent::Error { message } => json!({
            "id": format!("error_{ts}"),
            "text": format!("{ERROR_TEXT_PREFIX}{message}"),
            "dateTime": date_time,
            "error": true,
        }),
    }
}

/// Browser clients call from any origin and must never see a cached answer.
pub fn with_public_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

#[inline]
pub fn error_body(code: &str, message: impl Into<String>) -> Value {
    json!({ "code": code, "message": message.into() })
}
