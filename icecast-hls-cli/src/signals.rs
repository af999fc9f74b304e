//! `SIGUSR1` counter dump (§6, `SPEC_FULL.md` §10 item 5): a background
//! thread from `signal-hook` waits on `SIGUSR1` and, each time it fires,
//! writes every source's and destination's [`pipeline_core::Counters`]
//! snapshot to stderr. This is a raw, unformatted dump — deliberately
//! outside the `tracing` stream, matching the original's direct
//! `fprintf(stderr, ...)` behavior on the same signal.

use std::io::Write as _;
use std::sync::Arc;

use pipeline_core::Counters;
use signal_hook::consts::SIGUSR1;
use signal_hook::iterator::Signals;

/// One stream's counters, labeled for the dump.
pub struct CounterEntry {
    pub label: String,
    pub counters: Arc<Counters>,
}

/// Spawn the `SIGUSR1` handler thread. `entries` is captured once at
/// startup; since every `Source`/`Destination` creates its `Counters`
/// before its thread starts and never replaces it, this stays valid for
/// the life of the process even though the label list itself is fixed at
/// wiring time (sources/destinations are never added after startup).
pub fn install(entries: Vec<CounterEntry>) {
    let mut signals = match Signals::new([SIGUSR1]) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGUSR1 handler, counter dump disabled");
            return;
        }
    };
    std::thread::Builder::new()
        .name("sigusr1-dump".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                if signal == SIGUSR1 {
                    dump(&entries);
                }
            }
        })
        .expect("failed to spawn signal handler thread");
}

fn dump(entries: &[CounterEntry]) {
    let stderr = std::io::stderr();
    let mut lock = stderr.lock();
    let _ = writeln!(lock, "-- icecast-hls counter dump --");
    for entry in entries {
        let snap = entry.counters.snapshot();
        let _ = writeln!(
            lock,
            "{label}: read={read} demux={demux} decode={decode} filter={filter} encode={encode} mux={mux} output={output} last_activity_unix_ms={last}",
            label = entry.label,
            read = snap.read,
            demux = snap.demux,
            decode = snap.decode,
            filter = snap.filter,
            encode = snap.encode,
            mux = snap.mux,
            output = snap.output,
            last = snap.last_activity_unix_ms,
        );
    }
}
