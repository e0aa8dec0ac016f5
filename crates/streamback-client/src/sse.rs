//! Event-stream transport: turns a `reqwest::Response` body into a `Stream<Item = SseEvent>`.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::Stream;
use tokio_stream::StreamExt;

use streamback_core::codec::{SseEvent, SseLineDecoder};

/// Parse a reqwest response body as an event stream.
pub fn parse_event_stream(
    response: reqwest::Response,
) -> impl Stream<Item = anyhow::Result<SseEvent>> {
    parse_byte_stream(response.bytes_stream())
}

/// Parse any byte stream as an event stream. Chunk boundaries may fall anywhere.
pub fn parse_byte_stream<S, E>(byte_stream: S) -> impl Stream<Item = anyhow::Result<SseEvent>>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            decoder: SseLineDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((Ok(event), state));
                }
                if state.finished {
                    return None;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.pending.extend(state.decoder.push(&chunk));
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(anyhow::anyhow!("event stream error: {e}")), state));
                    }
                    None => {
                        // Transport ended; dispatch anything left unterminated.
                        state.finished = true;
                        state.pending.extend(state.decoder.finish());
                    }
                }
            }
        },
    )
}

struct SseState<E> {
    byte_stream: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, E>> + Send>>,
    decoder: SseLineDecoder,
    pending: VecDeque<SseEvent>,
    finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>> + Send + 'static {
        let parts: Vec<Result<bytes::Bytes, std::io::Error>> =
            parts.iter().map(|p| Ok(bytes::Bytes::from_static(p.as_bytes()))).collect();
        futures::stream::iter(parts)
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let stream = parse_byte_stream(chunks(&["data: [\"[IN", "IT]\"]\n\ndata: sec", "ond\n\n"]));
        let events: Vec<SseEvent> = stream.map(|e| e.unwrap()).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "[\"[INIT]\"]");
        assert_eq!(events[1].data, "second");
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_flushed() {
        let stream = parse_byte_stream(chunks(&["data: first\n\ndata: tail"]));
        let events: Vec<SseEvent> = stream.map(|e| e.unwrap()).collect().await;
        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["first", "tail"]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from_static(b"data: ok\n\n")),
            Err(std::io::Error::other("reset")),
        ];
        let results: Vec<anyhow::Result<SseEvent>> =
            parse_byte_stream(futures::stream::iter(parts)).collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
