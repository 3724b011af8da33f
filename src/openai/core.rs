use std::pin::Pin;

use anyhow::{Error, Result};
use async_stream::try_stream;
use futures::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::chat::Fragment;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Failures while talking to the completion endpoint that carry
/// meaning beyond a plain transport error.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("API request failed with status {status}")]
    Api { status: u16, message: Option<String> },
    #[error("Provider reported an error mid-stream: {message}")]
    Provider { message: String },
    #[error("Stream chunk is missing a response id")]
    MissingFragmentId,
    #[error("Malformed stream chunk: {data}")]
    MalformedChunk {
        data: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Stream contained invalid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("Reading the response stream failed")]
    Http(#[from] reqwest::Error),
}

impl StreamError {
    /// The human readable reason given by the provider, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            StreamError::Api {
                message: Some(message),
                ..
            } => Some(message),
            StreamError::Provider { message } => Some(message),
            _ => None,
        }
    }

    fn from_error_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(String::from));
        StreamError::Api { status, message }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, Error>> + Send>>;

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    #[serde(default)]
    delta: Delta,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
    error: Option<ErrorDetail>,
}

impl CompletionChunk {
    fn into_fragment(self) -> Result<Fragment, StreamError> {
        if let Some(error) = self.error {
            return Err(StreamError::Provider {
                message: error
                    .message
                    .unwrap_or_else(|| String::from("unknown error")),
            });
        }
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(StreamError::MissingFragmentId),
        };
        let delta = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .unwrap_or_default();

        Ok(Fragment {
            id,
            model: self.model.unwrap_or_default(),
            delta,
        })
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Fragment(Fragment),
    Done,
    Skip,
}

/// Removes the next complete event from `buffer`, if there is one.
fn next_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let event: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(event[..end].to_vec())
}

fn parse_event(event: &[u8]) -> Result<SseEvent, StreamError> {
    let event = std::str::from_utf8(event)?;

    let data = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    // Comments, keep-alives and events with an empty payload
    if data.is_empty() {
        return Ok(SseEvent::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk = serde_json::from_str::<CompletionChunk>(&data)
        .inspect_err(|e| {
            tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
        })
        .map_err(|source| StreamError::MalformedChunk {
            data: data.clone(),
            source,
        })?;

    Ok(SseEvent::Fragment(chunk.into_fragment()?))
}

/// Requests a streamed chat completion and returns the response as a
/// stream of fragments, one per server-sent event.
///
/// The stream ends at `data: [DONE]` or when the body ends. Any
/// failure is yielded as the last item of the stream.
pub async fn completion_stream(
    messages: &[Message],
    api_base_url: &str,
    api_key: &str,
    model: &str,
) -> Result<FragmentStream, Error> {
    let payload = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    let url = format!("{}/chat/completions", api_base_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .json(&payload)
        .send()
        .await
        .map_err(StreamError::Http)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!("Completion request failed with status {}: {}", status, body);
        return Err(StreamError::from_error_body(status.as_u16(), &body).into());
    }

    let mut bytes = response.bytes_stream();

    let stream = try_stream! {
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| Error::from(StreamError::Http(e)))?;
            // Events can be split across frames so they are buffered
            // until the blank line that terminates them arrives.
            buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

            while let Some(event) = next_event(&mut buffer) {
                match parse_event(&event).map_err(Error::from)? {
                    SseEvent::Fragment(fragment) => {
                        tracing::debug!("Fragment {} (+{} bytes)", fragment.id, fragment.delta.len());
                        yield fragment;
                    }
                    SseEvent::Done => return,
                    SseEvent::Skip => {}
                }
            }
        }

        // Some servers close the body without a trailing blank line
        if let SseEvent::Fragment(fragment) = parse_event(&buffer).map_err(Error::from)? {
            yield fragment;
        }
    };

    Ok(boxed(stream))
}

fn boxed<S>(stream: S) -> FragmentStream
where
    S: Stream<Item = Result<Fragment, Error>> + Send + 'static,
{
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            r#""assistant""#
        );
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
    }

    #[test]
    fn test_role_deserialization() {
        assert_eq!(serde_json::from_str::<Role>(r#""system""#).unwrap(), Role::System);
        assert_eq!(
            serde_json::from_str::<Role>(r#""assistant""#).unwrap(),
            Role::Assistant
        );
        assert_eq!(serde_json::from_str::<Role>(r#""user""#).unwrap(), Role::User);
    }

    #[test]
    fn test_message_new() {
        let msg = Message::new(Role::User, "Hello world");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"user","content":"Hello world"}"#
        );
    }

    #[test]
    fn test_next_event_waits_for_blank_line() {
        let mut buffer = b"data: {\"id\":".to_vec();
        assert!(next_event(&mut buffer).is_none());

        buffer.extend_from_slice(b"\"a\"}\n\ndata: [DONE]");
        let event = next_event(&mut buffer).unwrap();
        assert_eq!(event, b"data: {\"id\":\"a\"}".to_vec());
        assert_eq!(buffer, b"data: [DONE]".to_vec());
    }

    #[test]
    fn test_parse_event_content() {
        let event = br#"data: {"id":"chatcmpl-1","model":"gpt-4","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(
            parse_event(event).unwrap(),
            SseEvent::Fragment(Fragment::new("chatcmpl-1", "gpt-4", "Hello"))
        );
    }

    #[test]
    fn test_parse_event_role_only_delta() {
        let event = br#"data: {"id":"chatcmpl-1","model":"gpt-4","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert_eq!(
            parse_event(event).unwrap(),
            SseEvent::Fragment(Fragment::new("chatcmpl-1", "gpt-4", ""))
        );
    }

    #[test]
    fn test_parse_event_without_choices() {
        let event = br#"data: {"id":"chatcmpl-1","model":"gpt-4","choices":[]}"#;
        assert_eq!(
            parse_event(event).unwrap(),
            SseEvent::Fragment(Fragment::new("chatcmpl-1", "gpt-4", ""))
        );
    }

    #[test]
    fn test_parse_event_done_and_skip() {
        assert_eq!(parse_event(b"data: [DONE]").unwrap(), SseEvent::Done);
        assert_eq!(parse_event(b": keep-alive").unwrap(), SseEvent::Skip);
        assert_eq!(parse_event(b"data: ").unwrap(), SseEvent::Skip);
        assert_eq!(parse_event(b"").unwrap(), SseEvent::Skip);
    }

    #[test]
    fn test_parse_event_missing_id() {
        let event = br#"data: {"model":"gpt-4","choices":[{"delta":{"content":"Hi"}}]}"#;
        assert!(matches!(
            parse_event(event),
            Err(StreamError::MissingFragmentId)
        ));

        let event = br#"data: {"id":"","model":"gpt-4","choices":[]}"#;
        assert!(matches!(
            parse_event(event),
            Err(StreamError::MissingFragmentId)
        ));
    }

    #[test]
    fn test_parse_event_malformed() {
        assert!(matches!(
            parse_event(b"data: {not json"),
            Err(StreamError::MalformedChunk { .. })
        ));
    }

    #[test]
    fn test_parse_event_provider_error() {
        let event = br#"data: {"error":{"message":"Rate limit reached"}}"#;
        let err = parse_event(event).unwrap_err();
        assert_eq!(err.reason(), Some("Rate limit reached"));
    }

    #[test]
    fn test_error_body_reason() {
        let err = StreamError::from_error_body(
            401,
            r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
        );
        assert_eq!(err.reason(), Some("Incorrect API key provided"));

        let err = StreamError::from_error_body(502, "<html>Bad Gateway</html>");
        assert_eq!(err.reason(), None);
        assert_eq!(err.to_string(), "API request failed with status 502");
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<Fragment, Error>> {
        stream.collect::<Vec<_>>().await
    }

    #[tokio::test]
    async fn test_completion_stream_content() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = r#"data: {"id":"chatcmpl-1","created":1234567890,"model":"gpt-4","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}

data: {"id":"chatcmpl-1","created":1234567890,"model":"gpt-4","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}

data: {"id":"chatcmpl-1","created":1234567890,"model":"gpt-4","choices":[{"index":0,"delta":{"content":" World"},"finish_reason":"stop"}]}

data: [DONE]

"#;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-4",
                "stream": true,
                "messages": [{"role": "user", "content": "Say hello"}],
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Say hello")];
        let base_url = format!("{}/v1", server.url());
        let stream = completion_stream(&messages, &base_url, "test-key", "gpt-4")
            .await
            .unwrap();
        let fragments: Vec<Fragment> = collect(stream)
            .await
            .into_iter()
            .map(|f| f.unwrap())
            .collect();

        mock.assert_async().await;
        assert_eq!(
            fragments,
            vec![
                Fragment::new("chatcmpl-1", "gpt-4", ""),
                Fragment::new("chatcmpl-1", "gpt-4", "Hello"),
                Fragment::new("chatcmpl-1", "gpt-4", " World"),
            ]
        );
    }

    #[tokio::test]
    async fn test_completion_stream_without_done() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\r\n\r\ndata: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"!\"}}]}";

        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let stream = completion_stream(&messages, &server.url(), "test-key", "m")
            .await
            .unwrap();
        let fragments: Vec<Fragment> = collect(stream)
            .await
            .into_iter()
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(
            fragments,
            vec![Fragment::new("a", "m", "Hi"), Fragment::new("a", "m", "!")]
        );
    }

    #[tokio::test]
    async fn test_completion_stream_error_status() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion_stream(&messages, &server.url(), "bad-key", "gpt-4").await;

        let err = match result {
            Ok(_) => panic!("Expected an error"),
            Err(err) => err,
        };
        let stream_err = err.downcast_ref::<StreamError>().unwrap();
        assert!(matches!(stream_err, StreamError::Api { status: 401, .. }));
        assert_eq!(stream_err.reason(), Some("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn test_completion_stream_malformed_chunk_ends_stream() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = r#"data: {"id":"a","model":"m","choices":[{"delta":{"content":"Par"}}]}

data: {"id":"a","model":

data: {"id":"a","model":"m","choices":[{"delta":{"content":"tial"}}]}

"#;

        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let stream = completion_stream(&messages, &server.url(), "test-key", "m")
            .await
            .unwrap();
        let items = collect(stream).await;

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().unwrap(),
            &Fragment::new("a", "m", "Par")
        );
        let err = items[1].as_ref().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StreamError>(),
            Some(StreamError::MalformedChunk { .. })
        ));
    }
}
