use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use spindle_io::{Canceled, ClockKind, ConcurrencyUnavailable};
use spindle_pool::{Options, ThreadPool};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn third_task_queues_behind_two_workers() {
    init_logging();
    let pool = ThreadPool::with_options(Options::new().with_async_limit(2));
    let io = pool.io();

    let start = Instant::now();
    let mut futs = Vec::new();
    for value in 1..=3 {
        futs.push(io.launch(move |io| {
            io.sleep(Duration::from_millis(50), ClockKind::Monotonic)
                .unwrap();
            value
        }));
    }
    for (fut, expected) in futs.iter_mut().zip(1..=3) {
        assert_eq!(*fut.join(io), expected);
    }
    let elapsed = start.elapsed();
    // Two tasks run in parallel and the third queues: about two sleep
    // periods in total, never three.
    assert!(elapsed >= Duration::from_millis(95), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(150), "elapsed {elapsed:?}");
}

#[test]
fn concurrent_limit_zero_fails_immediately() {
    init_logging();
    let pool = ThreadPool::with_options(Options::new().with_concurrent_limit(0));
    let io = pool.io();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let result = io.launch_concurrent(move |_| flag.store(true, Ordering::SeqCst));
    assert_eq!(result.unwrap_err(), ConcurrencyUnavailable);
    assert!(!ran.load(Ordering::SeqCst), "no task may have executed");
}

#[test]
fn concurrent_slot_is_released_on_completion() {
    init_logging();
    let pool = ThreadPool::with_options(Options::new().with_concurrent_limit(1));
    let io = pool.io();

    let (release, gate) = mpsc::channel::<()>();
    let mut first = io
        .launch_concurrent(move |_| gate.recv().unwrap())
        .expect("limit not reached");

    let over = io.launch_concurrent(|_| ());
    assert_eq!(over.unwrap_err(), ConcurrencyUnavailable);

    release.send(()).unwrap();
    first.join(io);

    let mut again = io
        .launch_concurrent(|_| 5)
        .expect("slot released after completion");
    assert_eq!(*again.join(io), 5);
}

#[test]
fn concurrent_launch_is_not_queued_behind_busy_workers() {
    init_logging();
    // A warm worker still reads as idle for a moment after the blocker is
    // enqueued; the concurrency guarantee must not ride on that stale
    // count.
    let pool =
        ThreadPool::with_options(Options::new().with_async_limit(1).with_initial_workers(1));
    let io = pool.io();

    let (release, gate) = mpsc::channel::<()>();
    let blocker = io.launch(move |_| gate.recv().unwrap());

    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    let mut fut = io
        .launch_concurrent(move |_| flag.store(true, Ordering::SeqCst))
        .expect("concurrent capacity available");

    let deadline = Instant::now() + Duration::from_secs(2);
    while !started.load(Ordering::SeqCst) {
        assert!(
            Instant::now() < deadline,
            "concurrent task never started while the worker was held"
        );
        thread::yield_now();
    }
    fut.join(io);

    release.send(()).unwrap();
    let mut blocker = blocker;
    blocker.join(io);
}

#[test]
fn async_limit_binds_after_concurrent_growth() {
    init_logging();
    let pool =
        ThreadPool::with_options(Options::new().with_async_limit(1).with_concurrent_limit(8));
    let io = pool.io();

    // Grow well past async_limit with guaranteed-concurrent tasks, all
    // held open.
    let open = Arc::new(AtomicBool::new(false));
    let mut held = Vec::new();
    for _ in 0..3 {
        let open = open.clone();
        held.push(
            io.launch_concurrent(move |_| {
                while !open.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .expect("under the concurrent limit"),
        );
    }

    // Best-effort tasks must still be serialized onto the single worker.
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut futs = Vec::new();
    for _ in 0..3 {
        let running = running.clone();
        let peak = peak.clone();
        futs.push(io.launch(move |_| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            running.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    // Joining early would lend this thread to the queued tasks; let the
    // pool drain them at its own width first.
    thread::sleep(Duration::from_millis(200));
    for fut in &mut futs {
        fut.join(io);
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);

    open.store(true, Ordering::SeqCst);
    for fut in &mut held {
        fut.join(io);
    }
}

#[test]
fn joining_starved_queued_work_runs_it_on_the_caller() {
    init_logging();
    let pool = ThreadPool::with_options(Options::new().with_async_limit(1));
    let io = pool.io();

    let (release, gate) = mpsc::channel::<()>();
    let blocker = io.launch(move |_| gate.recv().unwrap());

    // The only worker is held by the blocker, so the join below can make
    // progress only by running the queued task itself.
    let caller = thread::current().id();
    let mut fut = io.launch(|_| thread::current().id());
    assert_eq!(*fut.join(io), caller);

    release.send(()).unwrap();
    let mut blocker = blocker;
    blocker.join(io);
}

#[test]
fn launch_concurrent_runs_on_a_distinct_thread() {
    init_logging();
    let pool = ThreadPool::new();
    let io = pool.io();

    let caller = thread::current().id();
    let mut fut = io
        .launch_concurrent(|_| thread::current().id())
        .expect("fresh pool has concurrent capacity");
    assert_ne!(*fut.join(io), caller);
}

#[test]
fn join_is_idempotent_and_never_reruns() {
    init_logging();
    let pool = ThreadPool::new();
    let io = pool.io();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let mut fut = io.launch(move |_| counter.fetch_add(1, Ordering::SeqCst) + 10);
    assert_eq!(*fut.join(io), 10);
    assert_eq!(*fut.join(io), 10);
    assert_eq!(*fut.cancel(io), 10);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn cooperative_cancel_is_acknowledged() {
    init_logging();
    let pool = ThreadPool::new();
    let io = pool.io();

    let started = Arc::new(AtomicBool::new(false));
    let entered = started.clone();
    let mut fut = io.launch(move |io| -> Result<(), Canceled> {
        entered.store(true, Ordering::SeqCst);
        loop {
            if io.cancel_requested() {
                return Err(Canceled);
            }
            thread::sleep(Duration::from_millis(1));
        }
    });
    while !started.load(Ordering::SeqCst) {
        thread::yield_now();
    }
    assert_eq!(*fut.cancel(io), Err(Canceled));
    // Idempotent: the cached result comes back without re-running the loop.
    assert_eq!(*fut.join(io), Err(Canceled));
}

#[test]
fn cancel_wakes_a_sleeping_task() {
    init_logging();
    let pool = ThreadPool::new();
    let io = pool.io();

    let start = Instant::now();
    let mut fut = io.launch(|io| io.sleep(Duration::from_secs(10), ClockKind::Monotonic));
    assert_eq!(*fut.cancel(io), Err(Canceled));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn panic_is_captured_and_rethrown_at_join() {
    init_logging();
    let pool = ThreadPool::new();
    let io = pool.io();

    let mut fut: spindle_io::Future<()> = io.launch(|_| panic!("boom"));
    let caught = panic::catch_unwind(AssertUnwindSafe(|| {
        fut.join(io);
    }));
    let payload = caught.expect_err("join rethrows the body panic");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    // One failing task never takes down a worker or the scheduler.
    let mut ok = io.launch(|_| 3);
    assert_eq!(*ok.join(io), 3);
}

#[test]
fn zero_async_limit_runs_on_the_caller() {
    init_logging();
    let pool = ThreadPool::with_options(Options::new().with_async_limit(0));
    let io = pool.io();

    let caller = thread::current().id();
    let mut fut = io.launch(|_| thread::current().id());
    assert_eq!(*fut.join(io), caller);

    // Nested launches keep running inline.
    let mut nested = io.launch(|io| {
        let mut inner = io.launch(|_| 2);
        *inner.join(io) * 3
    });
    assert_eq!(*nested.join(io), 6);
}

#[test]
fn worker_claims_a_queued_task_it_joins() {
    init_logging();
    // One worker: the outer task occupies it, so the inner task can only
    // complete if the joining worker runs it in place.
    let pool = ThreadPool::with_options(Options::new().with_async_limit(1));
    let io = pool.io();

    let mut outer = io.launch(|io| {
        let mut inner = io.launch(|_| 21);
        *inner.join(io) * 2
    });
    assert_eq!(*outer.join(io), 42);
}

#[test]
fn drop_drains_queued_tasks() {
    init_logging();
    let done = Arc::new(AtomicUsize::new(0));
    {
        let pool = ThreadPool::with_options(Options::new().with_async_limit(1));
        let io = pool.io();
        for _ in 0..16 {
            let counter = done.clone();
            // Detached: the results are not needed.
            let _ = io.launch(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
    }
    assert_eq!(done.load(Ordering::SeqCst), 16);
}

#[test]
fn warm_started_pool_reports_sane_options() {
    init_logging();
    let options = Options::new().with_async_limit(4).with_initial_workers(2);
    assert_eq!(options.async_limit, 4);
    assert_eq!(options.initial_workers, 2);
    let pool = ThreadPool::with_options(options);
    let io = pool.io();
    let mut fut = io.launch(|_| 1);
    assert_eq!(*fut.join(io), 1);
}

#[test]
fn sleep_outside_any_task_is_plain() {
    init_logging();
    let pool = ThreadPool::new();
    let io = pool.io();
    let start = Instant::now();
    io.sleep(Duration::from_millis(10), ClockKind::Real).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(10));
    assert!(!io.cancel_requested());
}
