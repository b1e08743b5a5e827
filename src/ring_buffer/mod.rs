use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A slot holding data and the epoch it was written at.
struct Slot<T> {
    data: T,
    epoch: u64, // epoch when this slot was last written
}

struct Ring<T> {
    slots: Vec<Slot<T>>,
    head: usize,
    tail: usize,
    read_epoch: u64, // reader's last seen epoch
}

impl<T> Ring<T> {
    fn is_empty(&self) -> bool {
        if self.head != self.tail {
            return false;
        }
        // head equals tail, empty if the reader has seen the slot
        self.slots[self.head].epoch <= self.read_epoch
    }

    fn is_full(&self) -> bool {
        self.head == self.tail && self.slots[self.head].epoch > self.read_epoch
    }
}

/// Bounded MPSC ring buffer with per-slot epochs.
///
/// Freshness bias: a push into a full buffer discards the oldest item.
pub struct RingBuffer<T> {
    ring: Mutex<Ring<T>>,
    write_epoch: AtomicU64, // writer's current epoch (inc on push)
    capacity: usize,
}

impl<T: Clone + Default> RingBuffer<T> {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be greater than 0");

        // init all slots with epoch 0
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot { data: T::default(), epoch: 0 });
        }

        RingBuffer {
            ring: Mutex::new(Ring { slots, head: 0, tail: 0, read_epoch: 0 }),
            write_epoch: AtomicU64::new(0),
            capacity,
        }
    }

    /// Push an item and return the epoch it was written at.
    pub fn push(&self, item: T) -> u64 {
        let mut ring = self.ring.lock();

        if ring.is_full() {
            // advance tail to discard oldest
            let tail = ring.tail;
            ring.read_epoch = ring.slots[tail].epoch;
            ring.tail = (tail + 1) % self.capacity;
        }

        let new_epoch = self.write_epoch.fetch_add(1, Ordering::AcqRel) + 1;

        let head = ring.head;
        ring.slots[head].data = item;
        ring.slots[head].epoch = new_epoch;
        ring.head = (head + 1) % self.capacity;

        new_epoch
    }

    /// Pop the oldest unseen item.
    pub fn pop(&self) -> Option<T> {
        let mut ring = self.ring.lock();

        if ring.is_empty() {
            return None;
        }

        let tail = ring.tail;
        let item = ring.slots[tail].data.clone();

        // mark this slot as seen
        ring.read_epoch = ring.slots[tail].epoch;
        ring.tail = (tail + 1) % self.capacity;

        Some(item)
    }

    /// Pop everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = self.pop() {
            out.push(item);
        }
        out
    }

    /// The newest item and its epoch, without consuming it.
    pub fn peek_latest(&self) -> Option<(T, u64)> {
        let ring = self.ring.lock();

        if ring.is_empty() {
            return None;
        }

        let latest_idx = if ring.head == 0 { self.capacity - 1 } else { ring.head - 1 };
        let slot = &ring.slots[latest_idx];
        Some((slot.data.clone(), slot.epoch))
    }

    pub fn latest_epoch(&self) -> u64 {
        self.write_epoch.load(Ordering::Acquire)
    }

    // current occupancy
    pub fn len(&self) -> usize {
        let ring = self.ring.lock();

        if ring.head == ring.tail {
            if ring.is_empty() { 0 } else { self.capacity }
        } else if ring.head > ring.tail {
            ring.head - ring.tail
        } else {
            self.capacity - ring.tail + ring.head
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.lock().is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
