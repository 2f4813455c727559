//! Resource Manager - Scoped Working Areas
//!
//! A working area is an in-memory byte pool keyed by image index. One area
//! brackets one merge call; one slot holds one image's raw bytes between
//! fetch and decode.
//!
//! Release is idempotent on both levels. Dropping an `AreaGuard` or a
//! `TempSlot` releases it, so every exit path cleans up. Cleanup anomalies
//! are logged, never returned.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("working area {0} has already been released")]
    AreaReleased(Uuid),

    #[error("slot {index} is already held in working area {area}")]
    SlotInUse { area: Uuid, index: usize },

    #[error("slot {index} in working area {area} holds no data")]
    SlotEmpty { area: Uuid, index: usize },
}

#[derive(Debug, Default)]
struct Counters {
    areas_open: AtomicUsize,
    slots_open: AtomicUsize,
    slots_acquired: AtomicUsize,
}

/// Point-in-time view of what a `ResourceManager` still holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub areas_open: usize,
    pub slots_open: usize,
    pub slots_acquired: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceManager {
    counters: Arc<Counters>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire_working_area(&self) -> AreaGuard {
        let id = Uuid::new_v4();
        self.counters.areas_open.fetch_add(1, Ordering::SeqCst);
        log::debug!("acquired working area {}", id);

        AreaGuard {
            area: WorkingArea {
                inner: Arc::new(AreaInner {
                    id,
                    pool: Mutex::new(HashMap::new()),
                    released: AtomicBool::new(false),
                    counters: Arc::clone(&self.counters),
                }),
            },
        }
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            areas_open: self.counters.areas_open.load(Ordering::SeqCst),
            slots_open: self.counters.slots_open.load(Ordering::SeqCst),
            slots_acquired: self.counters.slots_acquired.load(Ordering::SeqCst),
        }
    }
}

type Pool = HashMap<usize, Option<Arc<[u8]>>>;

#[derive(Debug)]
struct AreaInner {
    id: Uuid,
    pool: Mutex<Pool>,
    released: AtomicBool,
    counters: Arc<Counters>,
}

impl AreaInner {
    fn pool(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|poisoned| {
            log::warn!("working area {} pool lock poisoned, recovering", self.id);
            poisoned.into_inner()
        })
    }
}

/// Shared handle to one call's working area. Cheap to clone into tasks.
#[derive(Debug, Clone)]
pub struct WorkingArea {
    inner: Arc<AreaInner>,
}

impl WorkingArea {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub fn live_slots(&self) -> usize {
        self.inner.pool().len()
    }

    pub fn acquire_slot(&self, index: usize) -> Result<TempSlot, ResourceError> {
        let mut pool = self.inner.pool();
        if self.is_released() {
            return Err(ResourceError::AreaReleased(self.inner.id));
        }
        if pool.contains_key(&index) {
            return Err(ResourceError::SlotInUse { area: self.inner.id, index });
        }
        pool.insert(index, None);
        self.inner.counters.slots_open.fetch_add(1, Ordering::SeqCst);
        self.inner.counters.slots_acquired.fetch_add(1, Ordering::SeqCst);

        Ok(TempSlot {
            area: self.clone(),
            index,
            released: false,
        })
    }

    /// Release the area and everything still pooled in it.
    ///
    /// Returns `true` only for the call that actually released it.
    pub fn release(&self) -> bool {
        let mut pool = self.inner.pool();
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        if !pool.is_empty() {
            log::warn!(
                "working area {} released with {} slot(s) still held",
                self.inner.id,
                pool.len()
            );
        }
        pool.clear();
        self.inner.counters.areas_open.fetch_sub(1, Ordering::SeqCst);
        log::debug!("released working area {}", self.inner.id);
        true
    }
}

/// Owns the release of a working area. Dropping it releases the area.
#[derive(Debug)]
pub struct AreaGuard {
    area: WorkingArea,
}

impl AreaGuard {
    pub fn area(&self) -> &WorkingArea {
        &self.area
    }
}

impl Deref for AreaGuard {
    type Target = WorkingArea;

    fn deref(&self) -> &WorkingArea {
        &self.area
    }
}

impl Drop for AreaGuard {
    fn drop(&mut self) {
        self.area.release();
    }
}

/// Transient storage for one image's bytes. Released on drop.
#[derive(Debug)]
pub struct TempSlot {
    area: WorkingArea,
    index: usize,
    released: bool,
}

impl TempSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn write(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<(), ResourceError> {
        let mut pool = self.area.inner.pool();
        if self.released || self.area.is_released() {
            return Err(ResourceError::AreaReleased(self.area.id()));
        }
        pool.insert(self.index, Some(bytes.into()));
        Ok(())
    }

    pub fn read(&self) -> Result<Arc<[u8]>, ResourceError> {
        let pool = self.area.inner.pool();
        if self.released || self.area.is_released() {
            return Err(ResourceError::AreaReleased(self.area.id()));
        }
        pool.get(&self.index)
            .and_then(|entry| entry.clone())
            .ok_or(ResourceError::SlotEmpty { area: self.area.id(), index: self.index })
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.area.inner.pool().remove(&self.index).is_none() {
            log::debug!(
                "slot {} already gone from working area {}",
                self.index,
                self.area.id()
            );
        }
        self.area.inner.counters.slots_open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for TempSlot {
    fn drop(&mut self) {
        self.release();
    }
}
