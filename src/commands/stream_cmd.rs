use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::models::section::StreamEvent;
use crate::AppState;

/// Small buffer: a slow client holds the pipeline back instead of piling up events.
const EVENT_BUFFER: usize = 4;

pub fn to_sse_event(event: &StreamEvent) -> Event {
    Event::default().event(event.kind()).data(event.data().to_string())
}

/// Server-sent events: `start`, one `section`/`error` per section in declared
/// order, then `complete`. Dropping the connection closes the channel, which
/// stops the pipeline at its next section boundary.
pub async fn comprehensive_market_data(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request_id = uuid::Uuid::new_v4();
    log::info!("API call: comprehensive_market_data [{}]", request_id);
    let (tx, rx) = mpsc::channel::<StreamEvent>(EVENT_BUFFER);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        let snapshot = pipeline.stream(tx).await;
        log::info!("API success: comprehensive_market_data [{}] - {} sections", request_id, snapshot.len());
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
