use crate::error::{Error, Result};
use crate::proxy::{ByteChunks, Upstream};
use crate::{RequestBuilder, channel::ChannelConfig, data::UpstreamRequest, messages::Message};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, warn};

/// Client for OpenAI compatible `chat/completions` endpoints (OpenAI,
/// DeepSeek, gptlink).
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Upstream for OpenAIClient {
    async fn stream_chat_completion(
        &self,
        config: &ChannelConfig,
        messages: Vec<Message>,
    ) -> Result<ByteChunks> {
        let request = UpstreamRequest::chat_completions(config, messages)?;
        debug!(url = %request.url, model = %config.model, "opening upstream stream");
        let response = request_builder(&request, &self.http).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "upstream rejected chat completion");
            return Err(Error::InvalidResponseData(
                upstream_error_message(&text).into(),
                status.as_u16(),
            ));
        }

        Ok(response.bytes_stream().map_err(Error::from).boxed())
    }
}

fn request_builder(request: &UpstreamRequest, client: &reqwest::Client) -> RequestBuilder {
    client
        .post(&request.url)
        .header(reqwest::header::AUTHORIZATION, request.authorization())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(&request.body)
}

/// Vendors answer failures with `{"error": {"message": ...}}`; fall back to
/// the raw body when it has another shape.
fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, DEFAULT_TIMEOUT, SamplingParams};
    use bytes::Bytes;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(host: &str) -> ChannelConfig {
        ChannelConfig {
            channel:         Channel::Compatible("deepseek".into()),
            api_key:         "sk-test".into(),
            host:            host.to_owned().into(),
            proxy_host:      None,
            model:           "deepseek-chat".into(),
            context_tokens:  4000,
            response_tokens: 2500,
            system_prompt:   None,
            sampling:        SamplingParams::default(),
            timeout:         DEFAULT_TIMEOUT,
        }
    }

    fn messages() -> Vec<Message> {
        vec![Message::system("你是医疗助手"), Message::user("失眠怎么办？")]
    }

    #[test]
    fn test_prepare_chat_completions() {
        let request =
            UpstreamRequest::chat_completions(&config("https://api.deepseek.com/"), messages()).unwrap();

        assert_eq!(request.url, "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(request.authorization(), "Bearer sk-test");
        let body = &request.body;
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 2500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "失眠怎么办？");
        for field in ["temperature", "top_p", "frequency_penalty", "presence_penalty"] {
            assert!(body[field].is_number(), "missing {field}");
        }
    }

    #[test]
    fn test_upstream_error_message() {
        assert_eq!(
            upstream_error_message(r#"{"error":{"message":"Incorrect API key provided"}}"#),
            "Incorrect API key provided"
        );
        assert_eq!(upstream_error_message(" bad gateway \n"), "bad gateway");
    }

    #[tokio::test]
    async fn test_stream_chat_completion_yields_raw_body() {
        let server = MockServer::start().await;
        let body = "data: {\"id\":\"1\",\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({ "stream": true, "model": "deepseek-chat" })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAIClient::new(reqwest::Client::new());
        let chunks = client
            .stream_chat_completion(&config(&server.uri()), messages())
            .await
            .expect("upstream accepted");
        let received: Vec<Bytes> = chunks.try_collect().await.unwrap();
        let received: Vec<u8> = received.concat();

        assert_eq!(String::from_utf8(received).unwrap(), body);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "error": { "message": "invalid key" } })),
            )
            .mount(&server)
            .await;

        let client = OpenAIClient::new(reqwest::Client::new());
        let err = match client
            .stream_chat_completion(&config(&server.uri()), messages())
            .await
        {
            Ok(_) => panic!("401 must not open a stream"),
            Err(err) => err,
        };

        match err {
            Error::InvalidResponseData(message, status) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        // nothing listens on the discard port
        let client = OpenAIClient::new(reqwest::Client::new());
        let result = client
            .stream_chat_completion(&config("http://127.0.0.1:9"), messages())
            .await;
        assert!(matches!(result, Err(Error::ReqwestError(_))));
    }
}
