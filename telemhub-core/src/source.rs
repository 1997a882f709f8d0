//! Upstream event sources.

use async_trait::async_trait;
use telemhub_types::Event;
use tokio::sync::mpsc;

/// Yields one decoded event per call.
///
/// The driver polls `next_event` inside `tokio::select!`, so implementations
/// must be cancel-safe: dropping the returned future before it completes
/// must not lose an event. Returning `None` ends the stream.
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Option<Event>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<Event> {
    async fn next_event(&mut self) -> Option<Event> {
        self.recv().await
    }
}

#[async_trait]
impl<S: EventSource + ?Sized> EventSource for Box<S> {
    async fn next_event(&mut self) -> Option<Event> {
        (**self).next_event().await
    }
}
