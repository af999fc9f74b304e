//! # Source <-> destination rendezvous (`DestinationSync`)
//!
//! One producer (a source thread) fans out to N consumers (destination
//! threads), each through its own unbuffered rendezvous (§3/§5). The
//! original is atomics + two OS signals (`ready`/`consumed`) guarding a
//! `type`/`data` pair; here that's a zero-capacity channel carrying an
//! owned [`Event`] for `ready`, a second zero-capacity channel for
//! `consumed`, and a shared [`std::sync::atomic::AtomicI32`] for `status`
//! (§9: "replace with either a synchronous rendezvous channel ... or two
//! paired semaphores — semantics are equivalent").
//!
//! Event ordering on the consumer side matters (§5 step 3): for `Frame`/
//! `Tags`, the deep copy already happened when the channel moved the owned
//! value across threads, so the consumer stores `status=0`, raises
//! `consumed` (releasing the producer immediately), and only then invokes
//! the handler on its private copy — an error discovered there is stored
//! into `status` but isn't observed by the producer until its *next*
//! `send`, which re-reads `status` before blocking again (§5 step 1). This
//! is a deliberate race: it lets the fast path avoid waiting on handler
//! completion, at the cost of one event of latency in error detection.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::mpsc::{Receiver, RecvError, SyncSender, sync_channel};

use frame::{Frame, FrameSource};
use tagmodel::TagList;

/// One handoff across the rendezvous. `Open` carries the upstream
/// descriptor a `Filter..Output` chain reopens against; `Frame`/`Tags` are
/// the steady-state data path.
#[derive(Debug, Clone)]
pub enum Event {
    Open(FrameSource),
    Frame(Frame),
    Tags(TagList),
    Flush,
    Reset,
    Eof,
    /// Emergency, non-blocking cancellation (§5): sent without waiting on
    /// `consumed`, used during process shutdown.
    Quit,
}

/// Exit status a consumer loop returns when it observes [`Event::Quit`]
/// rather than a normal close.
pub const STATUS_QUIT: i32 = -2;

/// The producer (source thread) handle. Exactly one per (source,
/// destination) pair; `Clone` only to let a `DestinationList` hold it
/// alongside a join handle — cloning does not create a second producer,
/// callers must still only ever call `send`/`quit` from one thread.
pub struct Producer {
    ready_tx: SyncSender<Event>,
    consumed_rx: Receiver<()>,
    status: Arc<AtomicI32>,
}

/// The consumer (destination thread) handle.
pub struct Consumer {
    ready_rx: Receiver<Event>,
    consumed_tx: SyncSender<()>,
    status: Arc<AtomicI32>,
}

/// Build one rendezvous pair. Capacity 0 on both channels makes `send`
/// block until the peer is ready to receive, matching the unbuffered
/// handshake (§5 "Backpressure").
pub fn pair() -> (Producer, Consumer) {
    let (ready_tx, ready_rx) = sync_channel(0);
    let (consumed_tx, consumed_rx) = sync_channel(0);
    let status = Arc::new(AtomicI32::new(0));
    (
        Producer { ready_tx, consumed_rx, status: status.clone() },
        Consumer { ready_rx, consumed_tx, status },
    )
}

/// A detached handle for emergency cancellation of one (source,
/// destination) pair, independent of the owning [`Source`](../stages/struct.Source.html)'s
/// lifetime. `Producer::quit_handle` clones just the pieces `quit`/
/// `mark_cancelled` need (the `ready_tx` sender and the shared `status`),
/// so a wiring layer can keep a flat list of every destination's handle
/// for the process-wide shortflag escalation (§5 "if set, the source's
/// quit routine marks every destination's status non-zero") without
/// needing to reach back into whichever `Source` thread owns the real
/// `Producer`.
#[derive(Clone)]
pub struct QuitHandle {
    ready_tx: SyncSender<Event>,
    status: Arc<AtomicI32>,
}

impl QuitHandle {
    /// Non-blocking emergency cancellation, same semantics as
    /// [`Producer::quit`].
    pub fn quit(&self) {
        let _ = self.ready_tx.try_send(Event::Quit);
    }

    /// Mark the destination cancelled without sending anything (§5
    /// shortflag escalation), same semantics as [`Producer::mark_cancelled`].
    pub fn mark_cancelled(&self, status: i32) {
        debug_assert_ne!(status, 0);
        self.status.store(status, Ordering::Release);
    }
}

impl Producer {
    /// A detached [`QuitHandle`] for this producer, usable after the
    /// `Producer` itself has been moved into its owning source's thread.
    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle { ready_tx: self.ready_tx.clone(), status: self.status.clone() }
    }

    /// Push one event and block for the consumer's acknowledgement,
    /// returning its status (§5 producer steps 1-5). A non-zero status
    /// already observed before sending short-circuits without touching the
    /// channel, so a quit destination doesn't block a live one behind it.
    pub fn send(&self, event: Event) -> i32 {
        let current = self.status.load(Ordering::Acquire);
        if current != 0 {
            return current;
        }
        if self.ready_tx.send(event).is_err() {
            return STATUS_QUIT;
        }
        match self.consumed_rx.recv() {
            Ok(()) => self.status.load(Ordering::Acquire),
            Err(RecvError) => STATUS_QUIT,
        }
    }

    /// Non-blocking emergency cancellation: best-effort send of `Quit`
    /// without waiting on `consumed` (§5).
    pub fn quit(&self) {
        let _ = self.ready_tx.try_send(Event::Quit);
    }

    /// Mark this destination cancelled without sending anything, e.g. a
    /// process-wide shortflag escalation (§5).
    pub fn mark_cancelled(&self, status: i32) {
        debug_assert_ne!(status, 0);
        self.status.store(status, Ordering::Release);
    }

    pub fn status(&self) -> i32 {
        self.status.load(Ordering::Acquire)
    }
}

/// What a consumer does with a handoff; implemented by the `Filter..
/// Output` destination chain.
pub trait EventHandler {
    fn on_open(&mut self, upstream: &FrameSource) -> i32;
    fn on_frame(&mut self, frame: Frame) -> i32;
    fn on_tags(&mut self, tags: TagList) -> i32;
    fn on_flush(&mut self) -> i32;
    fn on_reset(&mut self) -> i32;
    fn on_eof(&mut self) -> i32;
}

impl Consumer {
    /// Drive the consumer loop until [`Event::Quit`], channel closure, or
    /// `handler` reports fatal non-zero `status` that the caller's policy
    /// treats as terminal (the loop itself keeps running on non-zero status;
    /// it's the *next* producer `send` that observes it and stops). Returns
    /// the final status: `STATUS_QUIT` on an explicit `Quit`, or whatever
    /// the last handler call stored.
    pub fn run(mut self, mut handler: impl EventHandler) -> i32 {
        loop {
            let event = match self.ready_rx.recv() {
                Ok(e) => e,
                Err(RecvError) => return self.status.load(Ordering::Acquire),
            };
            match event {
                Event::Quit => return STATUS_QUIT,
                Event::Frame(frame) => {
                    // Ack first (release the producer), deep-copy already
                    // happened via channel move; handle after.
                    self.status.store(0, Ordering::Release);
                    let _ = self.consumed_tx.send(());
                    let status = handler.on_frame(frame);
                    if status != 0 {
                        self.status.store(status, Ordering::Release);
                    }
                }
                Event::Tags(tags) => {
                    self.status.store(0, Ordering::Release);
                    let _ = self.consumed_tx.send(());
                    let status = handler.on_tags(tags);
                    if status != 0 {
                        self.status.store(status, Ordering::Release);
                    }
                }
                Event::Open(descriptor) => {
                    let status = handler.on_open(&descriptor);
                    self.status.store(status, Ordering::Release);
                    let _ = self.consumed_tx.send(());
                    if status != 0 {
                        return status;
                    }
                }
                Event::Flush => {
                    let status = handler.on_flush();
                    self.status.store(status, Ordering::Release);
                    let _ = self.consumed_tx.send(());
                }
                Event::Reset => {
                    let status = handler.on_reset();
                    self.status.store(status, Ordering::Release);
                    let _ = self.consumed_tx.send(());
                }
                Event::Eof => {
                    let status = handler.on_eof();
                    self.status.store(status, Ordering::Release);
                    let _ = self.consumed_tx.send(());
                    return status;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Counting {
        frames: usize,
        opened: bool,
        eof: bool,
    }

    impl EventHandler for Counting {
        fn on_open(&mut self, _upstream: &FrameSource) -> i32 {
            self.opened = true;
            0
        }
        fn on_frame(&mut self, _frame: Frame) -> i32 {
            self.frames += 1;
            0
        }
        fn on_tags(&mut self, _tags: TagList) -> i32 {
            0
        }
        fn on_flush(&mut self) -> i32 {
            0
        }
        fn on_reset(&mut self) -> i32 {
            0
        }
        fn on_eof(&mut self) -> i32 {
            self.eof = true;
            0
        }
    }

    fn test_frame(pts: i64) -> Frame {
        Frame::new_interleaved(samplefmt::SampleFormat::S16, 1, 1, 48000, pts, vec![0, 0]).unwrap()
    }

    #[test]
    fn ordered_frames_then_eof() {
        let (producer, consumer) = pair();
        let (report_tx, report_rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            let h = Counting { frames: 0, opened: false, eof: false };
            let status = consumer.run(ReportOnDrop { inner: h, report: report_tx });
            status
        });

        let src = FrameSource::new("pcm", 0b1, 48000, 1024);
        assert_eq!(producer.send(Event::Open(src)), 0);
        for i in 0..5 {
            assert_eq!(producer.send(Event::Frame(test_frame(i))), 0);
        }
        assert_eq!(producer.send(Event::Eof), 0);

        let status = handle.join().unwrap();
        assert_eq!(status, 0);
        let h = report_rx.recv().unwrap();
        assert!(h.opened);
        assert_eq!(h.frames, 5);
        assert!(h.eof);
    }

    /// Wraps a handler so the test can observe its final state after `run`
    /// consumes it.
    struct ReportOnDrop {
        inner: Counting,
        report: std::sync::mpsc::Sender<Counting>,
    }

    impl EventHandler for ReportOnDrop {
        fn on_open(&mut self, upstream: &FrameSource) -> i32 {
            self.inner.on_open(upstream)
        }
        fn on_frame(&mut self, frame: Frame) -> i32 {
            self.inner.on_frame(frame)
        }
        fn on_tags(&mut self, tags: TagList) -> i32 {
            self.inner.on_tags(tags)
        }
        fn on_flush(&mut self) -> i32 {
            self.inner.on_flush()
        }
        fn on_reset(&mut self) -> i32 {
            self.inner.on_reset()
        }
        fn on_eof(&mut self) -> i32 {
            let status = self.inner.on_eof();
            let _ = self.report.send(Counting {
                frames: self.inner.frames,
                opened: self.inner.opened,
                eof: self.inner.eof,
            });
            status
        }
    }

    #[test]
    fn quit_short_circuits_future_sends() {
        let (producer, consumer) = pair();
        let handle = thread::spawn(move || {
            let h = Counting { frames: 0, opened: false, eof: false };
            consumer.run(h)
        });
        producer.quit();
        let status = handle.join().unwrap();
        assert_eq!(status, STATUS_QUIT);
    }

    #[test]
    fn mark_cancelled_short_circuits_producer() {
        let (producer, consumer) = pair();
        drop(consumer);
        producer.mark_cancelled(7);
        assert_eq!(producer.send(Event::Flush), 7);
    }
}
