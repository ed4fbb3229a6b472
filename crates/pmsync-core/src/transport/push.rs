//! Server-push transport: server-sent events in, HTTP POST out.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;

use super::{identity_query, with_query, ConnectParams, Transport, WireMessage};
use crate::error::{Error, Result};
use crate::util::compact_text;

/// Receives messages from an event stream and posts outbound messages to
/// per-type endpoints under `api_base_url` with a bearer credential.
pub struct PushTransport {
    events_url: String,
    api_base_url: String,
    client: reqwest::Client,
    credential: Option<String>,
    events: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    decoder: EventStreamDecoder,
}

impl PushTransport {
    pub fn new(events_url: impl Into<String>, api_base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Transport(format!("HTTP client setup failed: {error}")))?;
        Ok(Self {
            events_url: events_url.into(),
            api_base_url: api_base_url.into(),
            client,
            credential: None,
            events: None,
            decoder: EventStreamDecoder::default(),
        })
    }

    fn endpoint(&self, message: &WireMessage) -> String {
        let path = match message {
            WireMessage::SyncRequest { .. } => "/sync-request",
            WireMessage::SyncResponse { .. } => "/sync-response",
            WireMessage::DataChange { .. } => "/data-change",
            WireMessage::Heartbeat { .. } => "/heartbeat",
        };
        format!("{}{path}", self.api_base_url)
    }
}

#[async_trait]
impl Transport for PushTransport {
    async fn open(&mut self, params: &ConnectParams) -> Result<()> {
        self.close().await;

        let url = with_query(&self.events_url, &identity_query(params));
        tracing::debug!("push: subscribing to {}", self.events_url);
        let response = self
            .client
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|error| {
                Error::Transport(format!("subscribe to {} failed: {error}", self.events_url))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "event stream {} answered {status}",
                self.events_url
            )));
        }

        self.events = Some(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
        );
        self.credential = Some(params.credential.clone());
        Ok(())
    }

    async fn send(&mut self, message: &WireMessage) -> Result<()> {
        let credential = self
            .credential
            .as_deref()
            .ok_or_else(|| Error::Transport("push channel is not open".to_string()))?;

        let endpoint = self.endpoint(message);
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(credential)
            .header("Content-Type", "application/json")
            .body(message.to_json()?)
            .send()
            .await
            .map_err(|error| Error::Transport(format!("POST {endpoint} failed: {error}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Transport(format!(
            "POST {endpoint} answered {status}: {}",
            compact_text(&body)
        )))
    }

    async fn next_message(&mut self) -> Option<Result<WireMessage>> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                if event.data.is_empty() {
                    continue;
                }
                return Some(decode_event(&event));
            }

            match self.events.as_mut()?.next().await {
                Some(Ok(chunk)) => self.decoder.push(&chunk),
                Some(Err(error)) => {
                    return Some(Err(Error::Transport(format!(
                        "event stream failed: {error}"
                    ))));
                }
                None => {
                    tracing::debug!("push: event stream ended");
                    self.events = None;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.events = None;
        self.credential = None;
        self.decoder = EventStreamDecoder::default();
    }

    fn is_bidirectional(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "push"
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServerEvent {
    /// Event name, `message` when the server sent none
    event: String,
    data: String,
}

/// Incremental `text/event-stream` framing.
#[derive(Debug, Default)]
struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));
    }

    fn next_event(&mut self) -> Option<ServerEvent> {
        let end = self.buffer.windows(2).position(|pair| pair == b"\n\n")?;
        let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
        let block = String::from_utf8_lossy(&block[..end]);

        let mut event = String::from("message");
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines() {
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => value.clone_into(&mut event),
                "data" => data.push(value),
                _ => {}
            }
        }

        Some(ServerEvent {
            event,
            data: data.join("\n"),
        })
    }
}

/// Named events may omit `type`; the event name supplies it. A named
/// `data_change` event carries the bare change record.
fn decode_event(event: &ServerEvent) -> Result<WireMessage> {
    let mut value: Value = serde_json::from_str(&event.data)?;

    let has_type = value.get("type").and_then(Value::as_str).is_some_and(|kind| {
        matches!(
            kind,
            "sync_request" | "sync_response" | "data_change" | "heartbeat"
        )
    });
    if has_type && (event.event != "data_change" || value.get("change").is_some()) {
        return Ok(serde_json::from_value(value)?);
    }

    match event.event.as_str() {
        "data_change" => Ok(WireMessage::DataChange {
            change: serde_json::from_value(value)?,
        }),
        "message" => Err(Error::InvalidInput(format!(
            "event without a message type: {}",
            compact_text(&event.data)
        ))),
        name => {
            if let Some(object) = value.as_object_mut() {
                object.insert("type".to_string(), Value::String(name.to_string()));
            }
            Ok(serde_json::from_value(value)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;
    use pretty_assertions::assert_eq;

    #[test]
    fn decoder_handles_split_chunks_and_comments() {
        let mut decoder = EventStreamDecoder::default();
        decoder.push(b": keep-alive\n\nevent: sync_resp");
        assert_eq!(
            decoder.next_event(),
            Some(ServerEvent {
                event: "message".to_string(),
                data: String::new(),
            })
        );
        assert_eq!(decoder.next_event(), None);

        decoder.push(b"onse\r\ndata: {\"requestId\":\"r1\",\r\ndata: \"timestamp\":5}\r\n\r\n");
        let event = decoder.next_event().unwrap();
        assert_eq!(event.event, "sync_response");
        assert_eq!(event.data, "{\"requestId\":\"r1\",\n\"timestamp\":5}");
    }

    #[test]
    fn named_events_supply_the_type() {
        let response = decode_event(&ServerEvent {
            event: "sync_response".to_string(),
            data: r#"{"requestId":"r1","changes":[],"timestamp":5}"#.to_string(),
        })
        .unwrap();
        assert_eq!(
            response,
            WireMessage::SyncResponse {
                request_id: "r1".to_string(),
                changes: Vec::new(),
                timestamp: 5,
            }
        );

        let change = decode_event(&ServerEvent {
            event: "data_change".to_string(),
            data: r#"{"id":"c1","type":"delete","entity":"project","entityId":"P1","timestamp":3,"userId":"bob"}"#
                .to_string(),
        })
        .unwrap();
        match change {
            WireMessage::DataChange { change } => {
                assert_eq!(change.change_type, ChangeType::Delete);
                assert_eq!(change.entity_id, "P1");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn default_events_need_a_type() {
        let heartbeat = decode_event(&ServerEvent {
            event: "message".to_string(),
            data: r#"{"type":"heartbeat","timestamp":9}"#.to_string(),
        })
        .unwrap();
        assert_eq!(heartbeat, WireMessage::Heartbeat { timestamp: 9 });

        let untyped = decode_event(&ServerEvent {
            event: "message".to_string(),
            data: r#"{"timestamp":9}"#.to_string(),
        });
        assert!(matches!(untyped, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn send_requires_open_channel() {
        let mut transport =
            PushTransport::new("http://127.0.0.1:9/events", "http://127.0.0.1:9/api").unwrap();
        assert!(!transport.is_bidirectional());
        assert_eq!(
            transport.endpoint(&WireMessage::Heartbeat { timestamp: 1 }),
            "http://127.0.0.1:9/api/heartbeat"
        );

        let result = transport
            .send(&WireMessage::Heartbeat { timestamp: 1 })
            .await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(transport.next_message().await.is_none());
    }
}
