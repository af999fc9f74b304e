//! `DestinationList` (§5): owns every `[destination.*]` section's
//! [`Destination`] plus the `Consumer` thread it runs `EventHandler::run`
//! on. Each destination thread is independent of every other once spawned
//! (§5 "no shared mutable state exists between Destination threads").

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use pipeline_core::Counters;
use rendezvous::{Consumer, STATUS_QUIT};
use tracing::{error, info};

use crate::destination::Destination;

/// One spawned destination thread, joined by [`DestinationList::join_all`].
struct Handle {
    id: String,
    join: JoinHandle<i32>,
    counters: Arc<Counters>,
}

/// Final status of one destination's thread once joined.
pub struct DestinationOutcome {
    pub id: String,
    pub status: i32,
}

impl DestinationOutcome {
    pub fn quit(&self) -> bool {
        self.status == STATUS_QUIT
    }

    pub fn ok(&self) -> bool {
        self.status == 0
    }
}

/// Owns every configured [`Destination`] and the threads they run the
/// rendezvous [`Consumer`] loop on (§5).
#[derive(Default)]
pub struct DestinationList {
    handles: Vec<Handle>,
}

impl DestinationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `destination`'s consumer thread against `consumer`. The
    /// matching `Producer` half must already be attached to the owning
    /// `Source` before its thread starts (§4.12).
    pub fn spawn(&mut self, destination: Destination, consumer: Consumer) {
        let id = destination.id().to_string();
        let counters = destination.counters();
        let thread_id = id.clone();
        let join = thread::Builder::new()
            .name(format!("destination-{thread_id}"))
            .spawn(move || {
                info!(destination = %thread_id, "destination thread started");
                let status = consumer.run(destination);
                info!(destination = %thread_id, status, "destination thread stopped");
                status
            })
            .expect("failed to spawn destination thread");
        self.handles.push(Handle { id, join, counters });
    }

    /// `(destination id, counters)` for every spawned destination, for the
    /// `SIGUSR1` dump (§6).
    pub fn counters(&self) -> Vec<(String, Arc<Counters>)> {
        self.handles.iter().map(|h| (h.id.clone(), h.counters.clone())).collect()
    }

    /// Join every destination thread in spawn order.
    pub fn join_all(self) -> Vec<DestinationOutcome> {
        self.handles
            .into_iter()
            .map(|handle| {
                let id = handle.id;
                let status = handle.join.join().unwrap_or_else(|_| {
                    error!(destination = %id, "destination thread panicked");
                    1
                });
                DestinationOutcome { id, status }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::TagPolicy;
    use crate::encoder::PassthroughEncoder;
    use crate::filter::PassthroughFilter;
    use muxers::packed::PackedMuxer;
    use outputs::StdoutOutput;
    use timeutil::IchTime;

    fn dest(id: &str) -> Destination {
        Destination::new(
            id,
            Box::new(PassthroughFilter::new()),
            Box::new(PassthroughEncoder::new()),
            Box::new(PackedMuxer::new()),
            Box::new(StdoutOutput::new()),
            TagPolicy::default(),
            IchTime::now(),
        )
    }

    #[test]
    fn spawn_and_join_reports_status() {
        let (producer, consumer) = rendezvous::pair();
        let mut list = DestinationList::new();
        list.spawn(dest("dest0"), consumer);
        assert_eq!(list.len(), 1);

        let upstream = frame::FrameSource::new("mp3", 0b11, 44100, 1152);
        assert_eq!(producer.send(rendezvous::Event::Open(upstream)), 0);
        assert_eq!(producer.send(rendezvous::Event::Eof), 0);

        let outcomes = list.join_all();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].ok());
        assert_eq!(outcomes[0].id, "dest0");
    }

    #[test]
    fn quit_is_reported_as_quit_status() {
        let (producer, consumer) = rendezvous::pair();
        let mut list = DestinationList::new();
        list.spawn(dest("dest1"), consumer);
        producer.quit();
        let outcomes = list.join_all();
        assert!(outcomes[0].quit());
    }
}
