//! Lock-free metering report ring
//!
//! Single-producer single-consumer ring carrying [`MeteringSnapshot`] values
//! from the audio thread to a control/UI thread. Uses crossbeam's
//! cache-padded counters to prevent false sharing between cores.
//!
//! Overflow policy: when the consumer lags and the ring fills, the producer
//! drops the new snapshot instead of blocking or touching slots the consumer
//! may be reading. Metering is periodic, so a dropped report is superseded
//! ~100 ms later.

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use velvet_core::domain::MeteringSnapshot;

struct Shared {
    /// Slot storage; a slot is written only by the producer and read only
    /// after the write position has been published.
    buffer: Vec<UnsafeCell<MeteringSnapshot>>,
    mask: usize,
    capacity: usize,
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,
}

// Slots are only accessed according to the SPSC position protocol below.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// Producer half, owned by the audio thread
pub struct ReportProducer {
    shared: Arc<Shared>,
}

/// Consumer half, owned by the control thread
pub struct ReportConsumer {
    shared: Arc<Shared>,
}

/// Create a report ring with at least `capacity` slots
///
/// Capacity is rounded up to the next power of 2 for cheap index masking.
pub fn report_ring(mut capacity: usize) -> (ReportProducer, ReportConsumer) {
    if !capacity.is_power_of_two() {
        capacity = capacity.next_power_of_two();
    }
    let shared = Arc::new(Shared {
        buffer: (0..capacity)
            .map(|_| UnsafeCell::new(MeteringSnapshot::silent()))
            .collect(),
        mask: capacity - 1,
        capacity,
        write_pos: CachePadded::new(AtomicUsize::new(0)),
        read_pos: CachePadded::new(AtomicUsize::new(0)),
    });
    (
        ReportProducer {
            shared: Arc::clone(&shared),
        },
        ReportConsumer { shared },
    )
}

impl ReportProducer {
    /// Push a snapshot without blocking
    ///
    /// Returns false if the ring was full and the snapshot was dropped.
    pub fn push(&self, snapshot: MeteringSnapshot) -> bool {
        let write_pos = self.shared.write_pos.load(Ordering::Acquire);
        let read_pos = self.shared.read_pos.load(Ordering::Acquire);

        if write_pos - read_pos >= self.shared.capacity {
            return false;
        }

        let slot = write_pos & self.shared.mask;
        unsafe {
            // SAFETY: the slot is past the consumer's read position and the
            // producer is the only writer.
            *self.shared.buffer[slot].get() = snapshot;
        }
        // Release publishes the slot write before the position update.
        self.shared
            .write_pos
            .store(write_pos + 1, Ordering::Release);
        true
    }

    /// Current number of buffered snapshots
    pub fn len(&self) -> usize {
        let write_pos = self.shared.write_pos.load(Ordering::Acquire);
        let read_pos = self.shared.read_pos.load(Ordering::Acquire);
        write_pos - read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportConsumer {
    /// Pop the oldest snapshot, if any
    pub fn pop(&self) -> Option<MeteringSnapshot> {
        let read_pos = self.shared.read_pos.load(Ordering::Acquire);
        let write_pos = self.shared.write_pos.load(Ordering::Acquire);

        if read_pos == write_pos {
            return None;
        }

        let slot = read_pos & self.shared.mask;
        let snapshot = unsafe {
            // SAFETY: write_pos > read_pos, so the producer has published
            // this slot and will not touch it until read_pos advances.
            *self.shared.buffer[slot].get()
        };
        self.shared.read_pos.store(read_pos + 1, Ordering::Release);
        Some(snapshot)
    }

    /// Drain everything buffered, returning the most recent snapshot
    pub fn latest(&self) -> Option<MeteringSnapshot> {
        let mut latest = None;
        while let Some(s) = self.pop() {
            latest = Some(s);
        }
        latest
    }

    pub fn len(&self) -> usize {
        let write_pos = self.shared.write_pos.load(Ordering::Acquire);
        let read_pos = self.shared.read_pos.load(Ordering::Acquire);
        write_pos - read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
