use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use super::*;

struct Counter {
    value: Cell<u32>,
    log: RefCell<Vec<&'static str>>,
    handle: SchedulerHandle<Counter>,
}

#[fixture]
fn scheduler() -> Scheduler<Counter> {
    Scheduler::start("test-scheduler", |handle| Counter {
        value: Cell::new(0),
        log: RefCell::new(Vec::new()),
        handle,
    })
    .expect("scheduler starts")
}

#[rstest]
fn runs_tasks_on_the_scheduler_thread(scheduler: Scheduler<Counter>) {
    let name = scheduler
        .handle()
        .submit_and_wait(
            |_state| async { thread::current().name().map(str::to_owned) },
            None,
        )
        .expect("task completes");
    assert_eq!(name.as_deref(), Some("test-scheduler"));
}

#[rstest]
fn tasks_share_state_in_admission_order(scheduler: Scheduler<Counter>) {
    let handle = scheduler.handle();
    for label in ["first", "second", "third"] {
        handle
            .submit(move |state| async move {
                state.log.borrow_mut().push(label);
            })
            .expect("submitted");
    }
    let log = handle
        .submit_and_wait(|state| async move { state.log.borrow().clone() }, None)
        .expect("read log");
    assert_eq!(log, vec!["first", "second", "third"]);
}

#[rstest]
fn timeout_does_not_cancel_the_task(scheduler: Scheduler<Counter>) {
    let handle = scheduler.handle();
    let error = handle
        .submit_and_wait(
            |state| async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                state.value.set(state.value.get() + 1);
            },
            Some(Duration::from_millis(10)),
        )
        .expect_err("caller gives up first");
    assert!(matches!(error, BridgeError::Timeout { .. }));

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let value = handle
            .submit_and_wait(|state| async move { state.value.get() }, None)
            .expect("read counter");
        if value == 1 {
            break;
        }
        assert!(Instant::now() < deadline, "timed-out task never completed");
        thread::sleep(Duration::from_millis(20));
    }
}

#[rstest]
fn submissions_fail_after_stop(scheduler: Scheduler<Counter>) {
    let handle = scheduler.handle();
    scheduler.stop().expect("clean stop");
    assert!(!handle.is_running());
    let error = handle
        .submit_and_wait(|_state| async {}, Some(Duration::from_millis(50)))
        .expect_err("scheduler is gone");
    assert!(matches!(error, BridgeError::SchedulerUnavailable));
    assert!(matches!(
        handle.submit(|_state| async {}),
        Err(BridgeError::SchedulerUnavailable)
    ));
}

#[rstest]
fn blocking_wait_on_the_scheduler_thread_is_refused(scheduler: Scheduler<Counter>) {
    let result = scheduler
        .handle()
        .submit_and_wait(
            |state| async move {
                state
                    .handle
                    .submit_and_wait(|_inner| async {}, Some(Duration::from_millis(10)))
                    .map(|()| "nested wait returned")
            },
            Some(Duration::from_secs(2)),
        )
        .expect("outer task completes");
    assert!(matches!(result, Err(BridgeError::ReentrantWait)));
}

#[rstest]
#[tokio::test]
async fn async_callers_await_results(scheduler: Scheduler<Counter>) {
    let handle = scheduler.handle();
    let value = handle
        .call(
            |state| async move {
                state.value.set(41);
                state.value.get() + 1
            },
            Some(Duration::from_secs(2)),
        )
        .await
        .expect("task completes");
    assert_eq!(value, 42);
}
