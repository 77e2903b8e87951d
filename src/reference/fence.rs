//! Fences: a monotone counter with event bindings.

use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::device::ReferenceDevice;
use crate::api::{iid, ComObject, ComPtr, Fence, Guid, RefCount, Unknown};
use crate::error::ApiResult;
use crate::platform::Event;

struct FenceState {
    value: u64,
    /// Events waiting for the counter to reach their target. Each entry is
    /// delivered once and then dropped. Entries whose event was destroyed
    /// by every other holder are dropped undelivered.
    waiters: Vec<(u64, Event)>,
}

impl FenceState {
    fn prune_orphans(&mut self) {
        let before = self.waiters.len();
        self.waiters.retain(|(_, event)| !event.is_orphaned());
        let pruned = before - self.waiters.len();
        if pruned > 0 {
            trace!("Dropped {} bindings to destroyed events", pruned);
        }
    }
}

pub struct ReferenceFence {
    self_ref: Weak<ReferenceFence>,
    refcount: RefCount,
    device: Arc<ReferenceDevice>,
    pub(crate) id: u32,
    state: Mutex<FenceState>,
    reached: Condvar,
}

impl ReferenceFence {
    pub(crate) fn new(device: Arc<ReferenceDevice>, id: u32, initial_value: u64) -> Arc<Self> {
        debug!("CreateFence: id={}, initial={}", id, initial_value);
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            refcount: RefCount::new(),
            device,
            id,
            state: Mutex::new(FenceState {
                value: initial_value,
                waiters: Vec::new(),
            }),
            reached: Condvar::new(),
        })
    }

    pub(crate) fn from_interface(fence: &dyn Fence) -> Option<Arc<ReferenceFence>> {
        fence
            .as_any()
            .downcast_ref::<ReferenceFence>()
            .and_then(|f| f.self_ref.upgrade())
    }

    /// Set the counter and deliver every binding whose target is reached.
    pub(crate) fn set_value(&self, value: u64) {
        let mut state = self.state.lock();
        state.value = value;
        state.prune_orphans();
        let mut delivered = 0;
        state.waiters.retain(|(target, event)| {
            if *target <= value {
                event.signal();
                delivered += 1;
                false
            } else {
                true
            }
        });
        trace!("Fence {}: value={}, delivered {} events", self.id, value, delivered);
        self.reached.notify_all();
    }

    /// Block until the counter reaches `value`.
    pub(crate) fn wait_for(&self, value: u64) {
        let mut state = self.state.lock();
        while state.value < value {
            self.reached.wait(&mut state);
        }
    }

    #[cfg(test)]
    fn pending_bindings(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn final_release(&self) {
        debug!("Fence {} released", self.id);
        self.device.release();
    }
}

impl_unknown!(ReferenceFence, Fence, [iid::OBJECT, iid::DEVICE_CHILD, iid::PAGEABLE, iid::FENCE]);

impl Fence for ReferenceFence {
    fn completed_value(&self) -> u64 {
        self.state.lock().value
    }

    fn signal(&self, value: u64) -> ApiResult<()> {
        debug!("Fence {}: host signal {}", self.id, value);
        self.set_value(value);
        Ok(())
    }

    fn set_event_on_completion(&self, value: u64, event: Option<&Event>) -> ApiResult<()> {
        match event {
            Some(event) => {
                let mut state = self.state.lock();
                if state.value >= value {
                    event.signal();
                } else {
                    state.prune_orphans();
                    state.waiters.push((value, event.clone()));
                }
            }
            None => self.wait_for(value),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DeviceOptions, FenceFlags};
    use crate::platform::{create_event, destroy_event, WaitResult};
    use crate::reference::ReferenceRuntime;
    use crate::api::Runtime;

    #[test]
    fn test_binding_delivers_once() {
        let device = ReferenceRuntime::new().create_device(&DeviceOptions::default()).unwrap();
        let fence = device.create_fence(0, FenceFlags::NONE).unwrap();
        let event = create_event().unwrap();

        fence.set_event_on_completion(5, Some(&event)).unwrap();
        fence.signal(3).unwrap();
        assert_eq!(event.wait(0), WaitResult::Timeout);
        fence.signal(7).unwrap();
        assert_eq!(event.wait(0), WaitResult::Signaled);
        assert_eq!(event.wait(0), WaitResult::Timeout);
        fence.signal(9).unwrap();
        assert_eq!(event.wait(0), WaitResult::Timeout);
    }

    #[test]
    fn test_binding_reached_value_delivers_immediately() {
        let device = ReferenceRuntime::new().create_device(&DeviceOptions::default()).unwrap();
        let fence = device.create_fence(10, FenceFlags::NONE).unwrap();
        let event = create_event().unwrap();
        fence.set_event_on_completion(10, Some(&event)).unwrap();
        assert_eq!(event.wait(0), WaitResult::Signaled);
        // Null event with a reached value returns at once.
        fence.set_event_on_completion(4, None).unwrap();
    }

    #[test]
    fn test_same_event_multiple_targets() {
        let device = ReferenceRuntime::new().create_device(&DeviceOptions::default()).unwrap();
        let fence = device.create_fence(0, FenceFlags::NONE).unwrap();
        let event = create_event().unwrap();
        fence.set_event_on_completion(1, Some(&event)).unwrap();
        fence.set_event_on_completion(2, Some(&event)).unwrap();
        fence.signal(1).unwrap();
        assert_eq!(event.wait(0), WaitResult::Signaled);
        assert_eq!(event.wait(0), WaitResult::Timeout);
        fence.signal(2).unwrap();
        assert_eq!(event.wait(0), WaitResult::Signaled);
    }

    #[test]
    fn test_destroyed_event_bindings_are_dropped() {
        let device = ReferenceRuntime::new().create_device(&DeviceOptions::default()).unwrap();
        let fence = device.create_fence(0, FenceFlags::NONE).unwrap();
        let reference = ReferenceFence::from_interface(&*fence).unwrap();

        let abandoned = create_event().unwrap();
        fence.set_event_on_completion(u64::MAX, Some(&abandoned)).unwrap();
        let kept = create_event().unwrap();
        fence.set_event_on_completion(3, Some(&kept)).unwrap();
        assert_eq!(reference.pending_bindings(), 2);

        destroy_event(abandoned);
        let other = create_event().unwrap();
        fence.set_event_on_completion(4, Some(&other)).unwrap();
        assert_eq!(reference.pending_bindings(), 2);

        drop(other);
        fence.signal(3).unwrap();
        assert_eq!(kept.wait(0), WaitResult::Signaled);
        assert_eq!(reference.pending_bindings(), 0);
    }
}
