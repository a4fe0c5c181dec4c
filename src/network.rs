//! Abort-and-replace request channels.
//!
//! Every logical channel has at most one request in flight. Starting a new
//! request on a channel aborts the previous one, and a generation counter
//! makes sure nothing an aborted request may already have produced is ever
//! delivered.
//!
//! # Example
//!
//! ```ignore
//! let mut requests = Requests::new();
//! requests.get(Channel::ViewportEvents, async move { client.features(url).await });
//!
//! // In the event loop
//! while let Some(delivery) = requests.try_next() {
//!     merge(delivery.channel, delivery.data);
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Logical request channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
  /// Event polygons inside the current view
  ViewportEvents,
  /// Every event polygon for the filter
  FullEvents,
  /// Event points inside the current view
  ViewportClusters,
  /// Aggregated counts for the filter
  FullClusters,
}

impl Channel {
  pub const ALL: [Channel; 4] = [
    Channel::ViewportEvents,
    Channel::FullEvents,
    Channel::ViewportClusters,
    Channel::FullClusters,
  ];

  /// Whether a delivery on this channel covers the whole filter, not just the view
  pub fn is_complete(&self) -> bool {
    matches!(self, Channel::FullEvents | Channel::FullClusters)
  }
}

/// A successful response on a channel
#[derive(Debug)]
pub struct Delivery<T> {
  pub channel: Channel,
  pub data: T,
}

impl<T> Delivery<T> {
  pub fn complete(&self) -> bool {
    self.channel.is_complete()
  }
}

struct InFlight {
  generation: u64,
  handle: JoinHandle<()>,
}

type Message<T> = (Channel, u64, Result<T, String>);

/// Per-channel request slots sharing one result queue
pub struct Requests<T> {
  in_flight: HashMap<Channel, InFlight>,
  next_generation: u64,
  tx: mpsc::UnboundedSender<Message<T>>,
  rx: mpsc::UnboundedReceiver<Message<T>>,
}

impl<T: Send + 'static> Requests<T> {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      in_flight: HashMap::new(),
      next_generation: 0,
      tx,
      rx,
    }
  }

  /// Start `future` on `channel`, aborting whatever was in flight there.
  pub fn get<Fut>(&mut self, channel: Channel, future: Fut)
  where
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    self.abort(channel);

    self.next_generation += 1;
    let generation = self.next_generation;
    let tx = self.tx.clone();

    let handle = tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - the receiver is gone when the app shuts down
      let _ = tx.send((channel, generation, result));
    });

    self
      .in_flight
      .insert(channel, InFlight { generation, handle });
  }

  /// Abort the request on `channel`. Returns whether one was in flight.
  pub fn abort(&mut self, channel: Channel) -> bool {
    match self.in_flight.remove(&channel) {
      Some(old) => {
        old.handle.abort();
        tracing::trace!(?channel, generation = old.generation, "aborted request");
        true
      }
      None => false,
    }
  }

  pub fn abort_all(&mut self) {
    for channel in Channel::ALL {
      self.abort(channel);
    }
  }

  pub fn is_pending(&self, channel: Channel) -> bool {
    self.in_flight.contains_key(&channel)
  }

  /// Take the next delivery without waiting.
  pub fn try_next(&mut self) -> Option<Delivery<T>> {
    while let Ok(message) = self.rx.try_recv() {
      if let Some(delivery) = self.accept(message) {
        return Some(delivery);
      }
    }
    None
  }

  /// Wait for the next delivery.
  ///
  /// Cancel safe: nothing is lost if the future is dropped in a `select!`.
  pub async fn next(&mut self) -> Option<Delivery<T>> {
    loop {
      let message = self.rx.recv().await?;
      if let Some(delivery) = self.accept(message) {
        return Some(delivery);
      }
    }
  }

  /// Drop stale generations and failures, clear the slot of a finished request
  fn accept(&mut self, (channel, generation, result): Message<T>) -> Option<Delivery<T>> {
    match self.in_flight.get(&channel) {
      Some(current) if current.generation == generation => {
        self.in_flight.remove(&channel);
      }
      _ => {
        tracing::trace!(?channel, generation, "dropping result of aborted request");
        return None;
      }
    }

    match result {
      Ok(data) => Some(Delivery { channel, data }),
      Err(error) => {
        tracing::debug!(?channel, %error, "request failed");
        None
      }
    }
  }
}

impl<T> Drop for Requests<T> {
  fn drop(&mut self) {
    for (_, in_flight) in self.in_flight.drain() {
      in_flight.handle.abort();
    }
  }
}

impl<T> std::fmt::Debug for Requests<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Requests")
      .field("in_flight", &self.in_flight.keys().collect::<Vec<_>>())
      .field("next_generation", &self.next_generation)
      .finish_non_exhaustive()
  }
}
