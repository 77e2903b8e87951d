//! Host-side synchronization with queue work.

use std::cell::Cell;
use std::io;

use tracing::{debug, trace};

use crate::api::{
    CommandAllocator, CommandQueue, Device, Fence, FenceFlags, GraphicsCommandList,
    Resource, ResourceBarrier, ResourceStates, ALL_SUBRESOURCES,
};
use crate::error::HarnessError;
use crate::platform::{create_event, destroy_event, wait_event, WaitResult, INFINITE};

thread_local! {
    static WAIT_TIMEOUT_MS: Cell<u32> = const { Cell::new(INFINITE) };
}

/// Restores the previous bound when a scope ends, even by panic.
struct TimeoutScope(u32);

impl Drop for TimeoutScope {
    fn drop(&mut self) {
        WAIT_TIMEOUT_MS.with(|t| t.set(self.0));
    }
}

/// Run `f` with every fence wait on this thread bounded by `timeout_ms`.
/// `INFINITE` disables the bound.
pub fn with_wait_timeout<R>(timeout_ms: u32, f: impl FnOnce() -> R) -> R {
    let _scope = TimeoutScope(WAIT_TIMEOUT_MS.with(|t| t.replace(timeout_ms)));
    f()
}

/// The bound in effect on this thread.
pub fn wait_timeout() -> u32 {
    WAIT_TIMEOUT_MS.with(Cell::get)
}

/// Block until `fence` reaches `value`, bounded by [`wait_timeout`].
pub fn wait_for_fence(fence: &dyn Fence, value: u64) -> Result<(), HarnessError> {
    wait_for_fence_timeout(fence, value, wait_timeout())
}

/// Block until `fence` reaches `value` or `timeout_ms` passes.
///
/// A timed-out binding stays on the fence until its next update, which
/// drops it because the event has no other holder.
pub fn wait_for_fence_timeout(fence: &dyn Fence, value: u64, timeout_ms: u32) -> Result<(), HarnessError> {
    if fence.completed_value() >= value {
        return Ok(());
    }

    let event = create_event()?;
    fence
        .set_event_on_completion(value, Some(&event))
        .map_err(HarnessError::api("SetEventOnCompletion"))?;
    let result = wait_event(&event, timeout_ms);
    destroy_event(event);
    trace!("Fence wait for {}: {:?}", value, result);

    match result {
        WaitResult::Signaled => Ok(()),
        WaitResult::Timeout => Err(HarnessError::WaitTimeout { value, timeout_ms }),
        WaitResult::Failed => Err(HarnessError::Platform(io::Error::new(
            io::ErrorKind::Other,
            "event wait failed",
        ))),
    }
}

/// Wait until every submission made to `queue` so far has retired.
pub fn wait_queue_idle(device: &dyn Device, queue: &dyn CommandQueue) -> Result<(), HarnessError> {
    let fence = device
        .create_fence(0, FenceFlags::NONE)
        .map_err(HarnessError::api("CreateFence"))?;
    queue
        .signal(&*fence, 1)
        .map_err(HarnessError::api("Signal"))?;
    let result = wait_for_fence(&*fence, 1);
    debug!("Queue drained");
    result
}

/// Close `list` and submit it.
pub fn exec_command_list(
    queue: &dyn CommandQueue,
    list: &dyn GraphicsCommandList,
) -> Result<(), HarnessError> {
    list.close().map_err(HarnessError::api("Close"))?;
    queue.execute_command_lists(&[list]);
    Ok(())
}

/// Reset `allocator` and reopen `list` on it.
pub fn reset_command_list(
    list: &dyn GraphicsCommandList,
    allocator: &dyn CommandAllocator,
) -> Result<(), HarnessError> {
    allocator
        .reset()
        .map_err(HarnessError::api("CommandAllocator::Reset"))?;
    list.reset(allocator, None)
        .map_err(HarnessError::api("CommandList::Reset"))
}

pub fn transition_resource_state(
    list: &dyn GraphicsCommandList,
    resource: &dyn Resource,
    before: ResourceStates,
    after: ResourceStates,
) {
    transition_sub_resource_state(list, resource, ALL_SUBRESOURCES, before, after);
}

pub fn transition_sub_resource_state(
    list: &dyn GraphicsCommandList,
    resource: &dyn Resource,
    subresource: u32,
    before: ResourceStates,
    after: ResourceStates,
) {
    list.resource_barrier(&[ResourceBarrier::Transition {
        resource,
        subresource,
        before,
        after,
    }]);
}

pub fn uav_barrier(list: &dyn GraphicsCommandList, resource: Option<&dyn Resource>) {
    list.resource_barrier(&[ResourceBarrier::Uav { resource }]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CommandListType, CommandQueueDesc, DeviceOptions, Runtime};
    use crate::reference::ReferenceRuntime;

    #[test]
    fn test_reached_fence_returns_immediately() {
        let device = ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap();
        let fence = device.create_fence(5, FenceFlags::NONE).unwrap();
        assert!(wait_for_fence(&*fence, 3).is_ok());
        assert!(wait_for_fence(&*fence, 5).is_ok());
    }

    #[test]
    fn test_timeout_is_scoped_per_thread() {
        let device = ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap();
        let fence = device.create_fence(0, FenceFlags::NONE).unwrap();
        assert_eq!(wait_timeout(), INFINITE);

        let result = with_wait_timeout(20, || {
            assert_eq!(std::thread::spawn(wait_timeout).join().unwrap(), INFINITE);
            with_wait_timeout(5, || assert_eq!(wait_timeout(), 5));
            assert_eq!(wait_timeout(), 20);
            wait_for_fence(&*fence, 1)
        });
        assert!(matches!(
            result,
            Err(HarnessError::WaitTimeout { value: 1, timeout_ms: 20 })
        ));
        assert_eq!(wait_timeout(), INFINITE);

        let unwound = std::panic::catch_unwind(|| with_wait_timeout(7, || panic!("inside")));
        assert!(unwound.is_err());
        assert_eq!(wait_timeout(), INFINITE);

        // The abandoned binding does not block later waits.
        fence.signal(1).unwrap();
        assert!(wait_for_fence_timeout(&*fence, 1, 0).is_ok());
        assert!(matches!(
            wait_for_fence_timeout(&*fence, 2, 0),
            Err(HarnessError::WaitTimeout { value: 2, timeout_ms: 0 })
        ));
    }

    #[test]
    fn test_queue_drain_and_list_cycle() {
        let device = ReferenceRuntime::new()
            .create_device(&DeviceOptions::default())
            .unwrap();
        let queue = device
            .create_command_queue(&CommandQueueDesc::new(CommandListType::Direct))
            .unwrap();
        let allocator = device
            .create_command_allocator(CommandListType::Direct)
            .unwrap();
        let list = device
            .create_command_list(0, CommandListType::Direct, &*allocator, None)
            .unwrap();

        exec_command_list(&*queue, &*list).unwrap();
        wait_queue_idle(&*device, &*queue).unwrap();
        reset_command_list(&*list, &*allocator).unwrap();
        exec_command_list(&*queue, &*list).unwrap();
        wait_queue_idle(&*device, &*queue).unwrap();
    }
}
