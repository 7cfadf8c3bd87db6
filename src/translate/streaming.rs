//! State machine for translating Converse stream events into Chat Completions chunks.
//!
//! The [`StreamTranslator`] processes backend events one at a time and emits zero or
//! more [`StreamItem`]s per event. It has two states: `Streaming` until a
//! `messageStop` arrives, then `Done`, after which every event is ignored.
//!
//! [`translate_stream`] lifts the state machine over a lazy event stream. It pulls one
//! event at a time, yields whatever that event produced, and stops pulling (dropping
//! the backend stream) as soon as the translator is done.

use futures::stream::{Stream, StreamExt};

use super::bedrock_types::ConverseStreamEvent;
use super::openai_types::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
use super::response::{completion_id, now_epoch_seconds};
use crate::error::Result;

/// Terminal marker sent after the final chunk.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One item of the client-visible stream.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Chunk(ChatCompletionChunk),
    Done,
}

impl StreamItem {
    /// Payload for the SSE `data:` line.
    ///
    /// # Errors
    /// Returns a JSON error if the chunk cannot be serialized.
    pub fn to_sse_data(&self) -> serde_json::Result<String> {
        match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk),
            Self::Done => Ok(DONE_SENTINEL.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Done,
}

/// Usage:
///   let mut translator = StreamTranslator::new("anthropic.claude-3-haiku-20240307-v1:0");
///   for event in backend_events {
///       for item in translator.process_event(&event) {
///           // send item as SSE
///       }
///   }
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    state: StreamState,
}

impl StreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            state: StreamState::Streaming,
        }
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == StreamState::Done
    }

    /// Process a single backend event, returning the items it produces.
    pub fn process_event(&mut self, event: &ConverseStreamEvent) -> Vec<StreamItem> {
        if self.is_done() {
            return Vec::new();
        }

        match event {
            ConverseStreamEvent::ContentBlockDelta(block) => match block.delta.text {
                Some(ref text) => vec![StreamItem::Chunk(self.make_chunk(
                    ChunkDelta {
                        content: Some(text.clone()),
                    },
                    None,
                ))],
                None => Vec::new(),
            },
            ConverseStreamEvent::MessageStop(stop) => {
                self.state = StreamState::Done;
                vec![
                    StreamItem::Chunk(
                        self.make_chunk(ChunkDelta::default(), Some(stop.stop_reason.clone())),
                    ),
                    StreamItem::Done,
                ]
            }
            ConverseStreamEvent::MessageStart(_)
            | ConverseStreamEvent::ContentBlockStart(_)
            | ConverseStreamEvent::ContentBlockStop(_)
            | ConverseStreamEvent::Metadata(_) => Vec::new(),
        }
    }

    fn make_chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: completion_id(),
            object: "chat.completion.chunk".to_string(),
            created: now_epoch_seconds(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}

/// Pull events until the translator produces its first items or the source ends.
///
/// Errors surfacing here happened before anything reached the client, so callers
/// report them as ordinary request failures.
///
/// # Errors
/// Returns the first backend error encountered.
pub async fn first_items<S>(translator: &mut StreamTranslator, events: &mut S) -> Result<Vec<StreamItem>>
where
    S: Stream<Item = Result<ConverseStreamEvent>> + Unpin,
{
    while let Some(event) = events.next().await {
        let items = translator.process_event(&event?);
        if !items.is_empty() {
            return Ok(items);
        }
    }
    Ok(Vec::new())
}

/// Translate a lazy stream of backend events into a lazy stream of items.
///
/// A backend error is yielded once and ends the stream without a `[DONE]` item.
pub fn translate_stream<S>(
    events: S,
    mut translator: StreamTranslator,
) -> impl Stream<Item = Result<StreamItem>> + Send + 'static
where
    S: Stream<Item = Result<ConverseStreamEvent>> + Send + 'static,
{
    async_stream::stream! {
        tokio::pin!(events);

        while !translator.is_done() {
            let Some(event) = events.next().await else {
                break;
            };

            match event {
                Ok(event) => {
                    for item in translator.process_event(&event) {
                        yield Ok(item);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::translate::bedrock_types::{MessageStartEvent, MetadataEvent};
    use futures::stream;

    fn delta_content(item: &StreamItem) -> Option<&str> {
        match item {
            StreamItem::Chunk(c) => c.choices[0].delta.content.as_deref(),
            StreamItem::Done => None,
        }
    }

    #[test]
    fn test_three_deltas_then_stop() {
        let mut translator = StreamTranslator::new("test-model");
        let events = [
            ConverseStreamEvent::MessageStart(MessageStartEvent {
                role: "assistant".to_string(),
            }),
            ConverseStreamEvent::text_delta("a"),
            ConverseStreamEvent::text_delta("b"),
            ConverseStreamEvent::text_delta("c"),
            ConverseStreamEvent::message_stop("COMPLETE"),
        ];

        let items: Vec<StreamItem> = events
            .iter()
            .flat_map(|e| translator.process_event(e))
            .collect();

        assert_eq!(items.len(), 5);
        assert_eq!(delta_content(&items[0]), Some("a"));
        assert_eq!(delta_content(&items[1]), Some("b"));
        assert_eq!(delta_content(&items[2]), Some("c"));

        match &items[3] {
            StreamItem::Chunk(chunk) => {
                assert_eq!(chunk.choices[0].delta, ChunkDelta::default());
                assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("COMPLETE"));
                assert_eq!(chunk.object, "chat.completion.chunk");
                assert_eq!(chunk.model, "test-model");
            }
            StreamItem::Done => panic!("expected final chunk"),
        }
        assert!(matches!(items[4], StreamItem::Done));
        assert!(translator.is_done());
    }

    #[test]
    fn test_content_chunks_have_null_finish_reason() {
        let mut translator = StreamTranslator::new("m");
        let items = translator.process_event(&ConverseStreamEvent::text_delta("hi"));

        match &items[0] {
            StreamItem::Chunk(c) => assert!(c.choices[0].finish_reason.is_none()),
            StreamItem::Done => panic!("expected chunk"),
        }
        assert_eq!(translator.state(), StreamState::Streaming);
    }

    #[test]
    fn test_events_after_stop_are_ignored() {
        let mut translator = StreamTranslator::new("m");
        let _ = translator.process_event(&ConverseStreamEvent::message_stop("end_turn"));

        assert!(translator
            .process_event(&ConverseStreamEvent::text_delta("late"))
            .is_empty());
        assert!(translator
            .process_event(&ConverseStreamEvent::message_stop("end_turn"))
            .is_empty());
    }

    #[test]
    fn test_metadata_and_textless_deltas_emit_nothing() {
        let mut translator = StreamTranslator::new("m");
        let metadata = ConverseStreamEvent::Metadata(MetadataEvent::default());
        let textless = ConverseStreamEvent::from_typed_payload(
            "contentBlockDelta",
            br#"{"contentBlockIndex":0,"delta":{"toolUse":{"input":"{}"}}}"#,
        )
        .unwrap()
        .unwrap();

        assert!(translator.process_event(&metadata).is_empty());
        assert!(translator.process_event(&textless).is_empty());
    }

    #[test]
    fn test_chunk_ids_are_fresh_per_chunk() {
        let mut translator = StreamTranslator::new("m");
        let first = translator.process_event(&ConverseStreamEvent::text_delta("a"));
        let second = translator.process_event(&ConverseStreamEvent::text_delta("b"));

        match (&first[0], &second[0]) {
            (StreamItem::Chunk(a), StreamItem::Chunk(b)) => assert_ne!(a.id, b.id),
            _ => panic!("expected chunks"),
        }
    }

    #[test]
    fn test_sse_data_for_done() {
        assert_eq!(StreamItem::Done.to_sse_data().unwrap(), "[DONE]");
    }

    #[test]
    fn test_translate_stream_stops_pulling_after_done() {
        let events = stream::iter(vec![
            Ok(ConverseStreamEvent::text_delta("x")),
            Ok(ConverseStreamEvent::message_stop("end_turn")),
            Err(GatewayError::backend("should never be pulled")),
        ]);

        let items: Vec<Result<StreamItem>> = tokio_test::block_on(
            translate_stream(events, StreamTranslator::new("m")).collect(),
        );

        assert_eq!(items.len(), 3);
        assert!(items.iter().all(std::result::Result::is_ok));
        assert!(matches!(items[2], Ok(StreamItem::Done)));
    }

    #[test]
    fn test_mid_stream_error_truncates_without_sentinel() {
        let events = stream::iter(vec![
            Ok(ConverseStreamEvent::text_delta("partial")),
            Err(GatewayError::backend("connection reset")),
            Ok(ConverseStreamEvent::message_stop("end_turn")),
        ]);

        let items: Vec<Result<StreamItem>> = tokio_test::block_on(
            translate_stream(events, StreamTranslator::new("m")).collect(),
        );

        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
        assert!(!items.iter().any(|i| matches!(i, Ok(StreamItem::Done))));
    }

    #[test]
    fn test_first_items_surfaces_early_errors() {
        let mut events = stream::iter(vec![
            Ok(ConverseStreamEvent::MessageStart(MessageStartEvent {
                role: "assistant".to_string(),
            })),
            Err(GatewayError::backend("throttled")),
        ]);
        let mut translator = StreamTranslator::new("m");

        let result = tokio_test::block_on(first_items(&mut translator, &mut events));
        assert!(matches!(result, Err(GatewayError::Backend { .. })));
    }

    #[test]
    fn test_first_items_returns_first_chunk() {
        let mut events = stream::iter(vec![
            Ok(ConverseStreamEvent::MessageStart(MessageStartEvent {
                role: "assistant".to_string(),
            })),
            Ok(ConverseStreamEvent::text_delta("Hel")),
            Ok(ConverseStreamEvent::text_delta("lo")),
        ]);
        let mut translator = StreamTranslator::new("m");

        let items = tokio_test::block_on(first_items(&mut translator, &mut events)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(delta_content(&items[0]), Some("Hel"));
    }
}
