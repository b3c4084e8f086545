use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A virtual-user execution slot. Owning one grants the right to run a
/// single iteration; ownership moves back to the pool on release.
#[derive(Debug)]
pub struct VuSlot {
    id: u64,
}

impl VuSlot {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct IdleSlot {
    slot: VuSlot,
    since: Instant,
}

#[derive(Debug)]
struct PoolState {
    /// Idle slots, oldest first. Acquire pops from the back so the front
    /// holds the longest-idle candidates for the grace sweep.
    idle: Vec<IdleSlot>,
    /// Slots currently in existence (idle + handed out).
    live: usize,
    next_id: u64,
}

/// Bounded pool of reusable VU slots.
///
/// A preallocated floor of slots exists for the whole scenario; slots above
/// the floor are created lazily up to `max` and discarded again once they
/// have been idle past the grace window.
#[derive(Debug)]
pub struct VuPool {
    pre_allocated: usize,
    max: usize,
    idle_grace: Duration,
    state: Mutex<PoolState>,
}

impl VuPool {
    pub fn new(pre_allocated: usize, max: usize, idle_grace: Duration) -> Self {
        let idle = (1..=pre_allocated as u64)
            .map(|id| IdleSlot {
                slot: VuSlot { id },
                since: Instant::now(),
            })
            .collect();

        Self {
            pre_allocated,
            max,
            idle_grace,
            state: Mutex::new(PoolState {
                idle,
                live: pre_allocated,
                next_id: pre_allocated as u64,
            }),
        }
    }

    pub fn pre_allocated(&self) -> usize {
        self.pre_allocated
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Slots currently in existence (never exceeds `max`).
    pub fn live(&self) -> usize {
        self.lock().live
    }

    pub fn idle(&self) -> usize {
        self.lock().idle.len()
    }

    /// Slots currently handed out to iterations.
    pub fn in_use(&self) -> usize {
        let st = self.lock();
        st.live - st.idle.len()
    }

    /// Non-blocking acquire: an idle slot if one exists, a fresh slot if the
    /// pool may still grow, `None` if the pool is exhausted.
    pub fn acquire(&self) -> Option<VuSlot> {
        let mut st = self.lock();
        self.sweep_expired(&mut st, Instant::now());

        if let Some(entry) = st.idle.pop() {
            return Some(entry.slot);
        }

        if st.live < self.max {
            st.live += 1;
            st.next_id += 1;
            return Some(VuSlot { id: st.next_id });
        }

        None
    }

    /// Acquire wrapped in a guard that releases on drop, so the slot returns
    /// to the pool on every exit path of an iteration.
    pub fn acquire_guard(self: &Arc<Self>) -> Option<VuGuard> {
        self.acquire().map(|slot| VuGuard {
            pool: Arc::clone(self),
            slot: Some(slot),
        })
    }

    pub fn release(&self, slot: VuSlot) {
        let now = Instant::now();
        let mut st = self.lock();
        st.idle.push(IdleSlot { slot, since: now });
        self.sweep_expired(&mut st, now);
    }

    fn sweep_expired(&self, st: &mut PoolState, now: Instant) {
        while st.live > self.pre_allocated {
            let expired = st
                .idle
                .first()
                .is_some_and(|e| now.duration_since(e.since) >= self.idle_grace);
            if !expired {
                break;
            }
            st.idle.remove(0);
            st.live -= 1;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owns a VU slot for the duration of one iteration.
#[derive(Debug)]
pub struct VuGuard {
    pool: Arc<VuPool>,
    slot: Option<VuSlot>,
}

impl VuGuard {
    pub fn slot_id(&self) -> u64 {
        self.slot.as_ref().map(VuSlot::id).unwrap_or(0)
    }
}

impl Drop for VuGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot);
        }
    }
}
