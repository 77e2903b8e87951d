use crate::api::{ComPtr, Device, Fence, FenceFlags};
use crate::error::{hr_of, Hresult};
use crate::harness::fixture::{destroy_test_context, init_test_context, TestContextDesc, TestEnv};
use crate::harness::report;
use crate::harness::sync::{wait_for_fence, wait_queue_idle};
use crate::platform::{create_event, create_thread, destroy_event, join_thread, wait_event, WaitResult, INFINITE};

fn bare_context_desc() -> TestContextDesc {
    TestContextDesc {
        no_render_target: true,
        no_root_signature: true,
        no_pipeline: true,
        ..Default::default()
    }
}

#[track_caller]
fn create_fence(device: &dyn Device, initial_value: u64) -> Option<ComPtr<dyn Fence>> {
    report::check_ok(device.create_fence(initial_value, FenceFlags::NONE), "Failed to create fence")
}

#[track_caller]
fn check_wait(result: WaitResult, expected: WaitResult) {
    report::check(result == expected, format!("Got {:?}, expected {:?}.", result, expected));
}

/// Host signals deliver a bound event once, when the target is reached.
pub fn test_fence_event_order(env: &TestEnv) {
    let Some(context) = init_test_context(env, Some(&bare_context_desc())) else {
        return;
    };

    if let (Some(fence), Some(event)) = (
        create_fence(&*context.device, 0),
        report::check_ok(create_event(), "Failed to create event"),
    ) {
        report::check_hr(hr_of(&fence.set_event_on_completion(5, Some(&event))), Hresult::S_OK, "SetEventOnCompletion");
        report::check_hr(hr_of(&fence.signal(3)), Hresult::S_OK, "Signal");
        check_wait(wait_event(&event, 0), WaitResult::Timeout);
        report::check_hr(hr_of(&fence.signal(7)), Hresult::S_OK, "Signal");
        report::check(fence.completed_value() == 7, format!("Got value {}.", fence.completed_value()));
        check_wait(wait_event(&event, 0), WaitResult::Signaled);
        check_wait(wait_event(&event, 0), WaitResult::Timeout);
        destroy_event(event);
    }

    destroy_test_context(context);
}

/// Queue-side signals only deliver the event at the bound value.
pub fn test_queue_signal_bound_event(env: &TestEnv) {
    let Some(context) = init_test_context(env, Some(&bare_context_desc())) else {
        return;
    };
    let device = &*context.device;
    let queue = &*context.queue;

    if let (Some(fence), Some(event)) = (
        create_fence(device, 0),
        report::check_ok(create_event(), "Failed to create event"),
    ) {
        report::check_hr(hr_of(&fence.set_event_on_completion(100, Some(&event))), Hresult::S_OK, "SetEventOnCompletion");
        for value in [50, 99] {
            report::check_hr(hr_of(&queue.signal(&*fence, value)), Hresult::S_OK, "Signal");
        }
        report::check_ok(wait_queue_idle(device, queue), "Failed to drain queue");
        report::check(fence.completed_value() == 99, format!("Got value {}.", fence.completed_value()));
        check_wait(wait_event(&event, 0), WaitResult::Timeout);

        report::check_hr(hr_of(&queue.signal(&*fence, 100)), Hresult::S_OK, "Signal");
        report::check_ok(wait_queue_idle(device, queue), "Failed to drain queue");
        check_wait(wait_event(&event, 0), WaitResult::Signaled);
        check_wait(wait_event(&event, 0), WaitResult::Timeout);
        destroy_event(event);
    }

    destroy_test_context(context);
}

pub fn test_fence_waits(env: &TestEnv) {
    let Some(context) = init_test_context(env, Some(&bare_context_desc())) else {
        return;
    };

    if let Some(fence) = create_fence(&*context.device, 10) {
        report::check_ok(wait_for_fence(&*fence, 5), "Wait for reached value");
        report::check_ok(wait_for_fence(&*fence, 10), "Wait for current value");

        // Binding a reached value sets the event at once.
        if let Some(event) = report::check_ok(create_event(), "Failed to create event") {
            report::check_hr(hr_of(&fence.set_event_on_completion(8, Some(&event))), Hresult::S_OK, "SetEventOnCompletion");
            check_wait(wait_event(&event, 0), WaitResult::Signaled);

            report::check_hr(hr_of(&fence.set_event_on_completion(u64::MAX, Some(&event))), Hresult::S_OK, "SetEventOnCompletion");
            check_wait(wait_event(&event, 0), WaitResult::Timeout);
            destroy_event(event);
        }

        // Values may go backwards through a host signal.
        report::check_hr(hr_of(&fence.signal(2)), Hresult::S_OK, "Signal");
        report::check(fence.completed_value() == 2, format!("Got value {}.", fence.completed_value()));
    }

    destroy_test_context(context);
}

/// A worker blocked on a fence event is released by a host signal.
pub fn test_multithread_fence_wait(env: &TestEnv) {
    let Some(context) = init_test_context(env, Some(&bare_context_desc())) else {
        return;
    };

    if let (Some(fence), Some(event)) = (
        create_fence(&*context.device, 0),
        report::check_ok(create_event(), "Failed to create event"),
    ) {
        report::check_hr(hr_of(&fence.set_event_on_completion(1, Some(&event))), Hresult::S_OK, "SetEventOnCompletion");

        let worker_event = event.clone();
        let worker_fence = fence.clone();
        let waiter = create_thread(move || {
            check_wait(wait_event(&worker_event, INFINITE), WaitResult::Signaled);
            report::check(worker_fence.completed_value() >= 1, "Event set before the fence value.");
            // Blocks without an event until the main thread signals 2.
            report::check_hr(
                hr_of(&worker_fence.set_event_on_completion(2, None)),
                Hresult::S_OK,
                "SetEventOnCompletion",
            );
        });

        if let Some(waiter) = report::check_ok(waiter, "Failed to create thread") {
            report::check_hr(hr_of(&fence.signal(1)), Hresult::S_OK, "Signal");
            report::check_hr(hr_of(&fence.signal(2)), Hresult::S_OK, "Signal");
            report::check(join_thread(waiter), "Worker thread failed.");
        }
        destroy_event(event);
    }

    destroy_test_context(context);
}
