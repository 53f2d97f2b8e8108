use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use kiln_sched::{
    Error, InlineRunner, JobInfo, ScheduleError, Scheduler, SchedulerConfig,
    Signal,
};

mod common;

use common::*;

fn counting_job(counter: &Arc<AtomicUsize>) -> JobInfo<&'static str> {
    let counter = Arc::clone(counter);
    JobInfo::new(move || { counter.fetch_add(1, SeqCst); })
}

#[test]
fn zero_capacity_is_rejected() {
    init_logging();
    let config = SchedulerConfig::default().with_max_jobs(0);
    match Sched::new(config) {
        Err(Error::Config(_)) => {},
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("scheduler accepted max_jobs = 0"),
    }
}

#[test]
fn capacity_counts_outstanding_jobs() {
    let sched = scheduler();
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..1024 {
        sched.try_schedule_job(Kind::Main, counting_job(&ran)).unwrap();
    }
    assert_eq!(sched.backend(Kind::Main).capacity(), 1024);
    assert_eq!(sched.backend(Kind::Main).outstanding_jobs(), 1024);

    let res = sched.try_schedule_job(Kind::Main,
        JobInfo::new(|| {}).named("overflow"));
    let err = match res {
        Err(err) => err,
        Ok(()) => panic!("backend accepted a job past capacity"),
    };
    assert_eq!(err.to_string(), "backend is at capacity");
    let ScheduleError::Full(ref job) = err;
    assert_eq!(job.name(), "overflow");
    assert_eq!(err.into_job().name(), "overflow");

    // Other backends have their own budget
    sched.try_schedule_job(Kind::Aux, JobInfo::new(|| {})).unwrap();

    with_workers(&sched, Kind::Main, 2, |s| s.finish(Kind::Main));
    assert_eq!(ran.load(SeqCst), 1024);
    assert_eq!(sched.backend(Kind::Main).outstanding_jobs(), 0);

    // Retired slots are reusable
    sched.try_schedule_job(Kind::Main, counting_job(&ran)).unwrap();
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "too many outstanding jobs")]
fn overflow_panics_in_debug() {
    let sched = scheduler();
    for _ in 0..1025 {
        sched.schedule_job(Kind::Main, JobInfo::new(|| {}));
    }
}

/// Schedules a job that holds its slot until `gate` opens and waits
/// until a worker is running it.
fn occupy_slot(sched: &Sched, gate: &Arc<Signal>) {
    let holding = Arc::new(Signal::new());
    let (g, h) = (Arc::clone(gate), Arc::clone(&holding));
    sched.schedule_job(Kind::Main, JobInfo::new(move || {
        h.set();
        g.wait();
    }).named("occupant"));
    assert!(holding.wait_timeout(TIMEOUT));
}

#[test]
fn running_jobs_count_against_capacity() {
    let sched = scheduler_with(SchedulerConfig::default().with_max_jobs(1));
    let gate = Arc::new(Signal::new());
    with_workers(&sched, Kind::Main, 1, |s| {
        let _open = SetOnDrop(Arc::clone(&gate));
        occupy_slot(s, &gate);
        assert_eq!(s.backend(Kind::Main).queued_jobs(), 0);
        match s.try_schedule_job(Kind::Main, JobInfo::new(|| {})) {
            Err(ScheduleError::Full(_)) => {},
            Ok(()) => panic!("running job did not count against capacity"),
        }
    });
    sched.try_schedule_job(Kind::Main, JobInfo::new(|| {})).unwrap();
}

// The failed submission itself trips the assertion, whatever happens
// to the backend afterwards.
#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "too many outstanding jobs")]
fn overflow_panics_while_job_runs() {
    let sched = scheduler_with(SchedulerConfig::default().with_max_jobs(1));
    let gate = Arc::new(Signal::new());
    with_workers(&sched, Kind::Main, 1, |s| {
        let _open = SetOnDrop(Arc::clone(&gate));
        occupy_slot(s, &gate);
        s.schedule_job(Kind::Main, JobInfo::new(|| {}));
    });
}

#[test]
fn completion_runs_after_job() {
    let sched = scheduler();
    let value = Arc::new(AtomicUsize::new(0));
    let signal_early = Arc::new(AtomicBool::new(true));
    let seen: Arc<Mutex<Option<(usize, Option<String>)>>> = Default::default();
    let done = Arc::new(Signal::new());
    let completed = Arc::new(Signal::new());

    let (v, d, early) =
        (Arc::clone(&value), Arc::clone(&done), Arc::clone(&signal_early));
    let (v2, seen2, c2) =
        (Arc::clone(&value), Arc::clone(&seen), Arc::clone(&completed));
    sched.schedule_job(Kind::Main, JobInfo::new(move || {
        v.store(42, SeqCst);
        early.store(d.is_set(), SeqCst);
    })
    .on_complete(move || {
        let name = thread::current().name().map(ToOwned::to_owned);
        *seen2.lock().unwrap() = Some((v2.load(SeqCst), name));
        c2.set();
    })
    .signal(Arc::clone(&done)));

    with_workers(&sched, Kind::Main, 1, |_| {
        assert!(done.wait_timeout(TIMEOUT));
        assert!(completed.wait_timeout(TIMEOUT));
    });

    assert!(!signal_early.load(SeqCst));
    let seen = seen.lock().unwrap().take().unwrap();
    assert_eq!(seen, (42, Some("kiln-deferred".to_owned())));
}

#[test]
fn inline_runner_completes_on_worker() {
    init_logging();
    let sched: Sched =
        Scheduler::with_runner(SchedulerConfig::default(), Arc::new(InlineRunner))
            .unwrap();
    let completion_thread = Arc::new(Mutex::new(None));
    let done = Arc::new(Signal::new());

    let ct = Arc::clone(&completion_thread);
    sched.schedule_job(Kind::Main, JobInfo::new(|| {})
        .on_complete(move || {
            *ct.lock().unwrap() =
                thread::current().name().map(ToOwned::to_owned);
        })
        .signal(Arc::clone(&done)));

    with_workers(&sched, Kind::Main, 1, |_| {
        assert!(done.wait_timeout(TIMEOUT));
        // Inline completions finish before the signal is set
        assert_eq!(completion_thread.lock().unwrap().as_deref(),
            Some("Main-worker-0"));
    });
}

#[test]
fn panicking_job_is_retired() {
    let sched = scheduler();
    let done = Arc::new(Signal::new());
    let completed = Arc::new(AtomicBool::new(false));
    let next = Arc::new(Signal::new());

    let c = Arc::clone(&completed);
    sched.schedule_job(Kind::Main, JobInfo::new(|| panic!("intentional test panic"))
        .named("doomed")
        .write("r")
        .on_complete(move || c.store(true, SeqCst))
        .signal(Arc::clone(&done)));
    sched.schedule_job(Kind::Main, JobInfo::new(|| {})
        .write("r")
        .signal(Arc::clone(&next)));

    with_workers(&sched, Kind::Main, 1, |s| {
        assert!(done.wait_timeout(TIMEOUT));
        // The same worker survives and the write lock was released
        assert!(next.wait_timeout(TIMEOUT));
        assert_eq!(s.backend(Kind::Main).active_workers(), 1);
    });
    wait_for(|| completed.load(SeqCst));
    assert!(sched.backend(Kind::Main).is_unlocked());
}

#[test]
fn freeing_leaves_queued_jobs() {
    let sched = scheduler();
    let gate = Arc::new(Signal::new());
    let holding = Arc::new(Signal::new());
    let ran = Arc::new(AtomicUsize::new(0));

    let (g, h) = (Arc::clone(&gate), Arc::clone(&holding));
    sched.schedule_job(Kind::Main, JobInfo::new(move || {
        h.set();
        g.wait();
    }).named("j0"));

    thread::scope(|s| {
        let _open = SetOnDrop(Arc::clone(&gate));
        s.spawn(|| sched.use_backend_thread(Kind::Main));
        assert!(holding.wait_timeout(TIMEOUT));

        sched.schedule_job(Kind::Main, counting_job(&ran).named("j1"));
        sched.schedule_job(Kind::Main, counting_job(&ran).named("j2"));

        let freer = s.spawn(|| sched.free_backend_threads(Kind::Main));
        wait_for(|| sched.backend(Kind::Main).is_shutting_down());
        // The running job is allowed to finish
        gate.set();
        freer.join().unwrap();
    });

    let backend = sched.backend(Kind::Main);
    assert_eq!(backend.active_workers(), 0);
    assert_eq!(backend.queued_jobs(), 2);
    assert_eq!(ran.load(SeqCst), 0);
    assert!(!backend.is_shutting_down());

    // The backend can be staffed again and picks up where it left off
    with_workers(&sched, Kind::Main, 1, |s| s.finish(Kind::Main));
    assert_eq!(ran.load(SeqCst), 2);
    assert_eq!(backend.outstanding_jobs(), 0);
}

// One worker runs the writer while the other has claimed a unit for the
// reader and is waiting for the lock. Freeing must hand that unit back.
#[test]
fn blocked_job_survives_free() {
    let sched = scheduler();
    let gate = Arc::new(Signal::new());
    let holding = Arc::new(Signal::new());
    let read = Arc::new(Signal::new());

    let (g, h) = (Arc::clone(&gate), Arc::clone(&holding));
    sched.schedule_job(Kind::Main, JobInfo::new(move || {
        h.set();
        g.wait();
    }).named("writer").write("r"));

    thread::scope(|s| {
        let _open = SetOnDrop(Arc::clone(&gate));
        for _ in 0..2 {
            s.spawn(|| sched.use_backend_thread(Kind::Main));
        }
        assert!(holding.wait_timeout(TIMEOUT));
        wait_for(|| sched.backend(Kind::Main).active_workers() == 2);
        sched.schedule_job(Kind::Main, JobInfo::new(|| {})
            .named("reader")
            .read("r")
            .signal(Arc::clone(&read)));

        let freer = s.spawn(|| sched.free_backend_threads(Kind::Main));
        wait_for(|| sched.backend(Kind::Main).is_shutting_down());
        gate.set();
        freer.join().unwrap();
    });
    assert!(!read.is_set());
    assert_eq!(sched.backend(Kind::Main).queued_jobs(), 1);

    with_workers(&sched, Kind::Main, 1, |_| {
        assert!(read.wait_timeout(TIMEOUT));
    });
    assert!(sched.backend(Kind::Main).is_unlocked());
}

#[test]
fn free_without_workers_returns() {
    let sched = scheduler();
    sched.free_backend_threads(Kind::Aux);
    assert!(!sched.backend(Kind::Aux).is_shutting_down());
}

#[test]
fn finish_timeout() {
    let sched = scheduler();
    assert!(sched.finish_timeout(Kind::Main, Duration::from_millis(1)));

    sched.schedule_job(Kind::Main, JobInfo::new(|| {}));
    assert!(!sched.finish_timeout(Kind::Main, Duration::from_millis(50)));
    assert_eq!(sched.backend(Kind::Main).queued_jobs(), 1);

    with_workers(&sched, Kind::Main, 1, |s| {
        assert!(s.finish_timeout(Kind::Main, TIMEOUT));
    });
}

#[test]
fn jobs_schedule_follow_ups() {
    let sched = Arc::new(scheduler());
    let follow_up = Arc::new(Signal::new());
    let transfer = Arc::new(Signal::new());

    let (s1, f1, t1) =
        (Arc::clone(&sched), Arc::clone(&follow_up), Arc::clone(&transfer));
    sched.schedule_job(Kind::Main, JobInfo::new(move || {
        // Conflicts with this job, so it waits for it to retire
        s1.schedule_job(Kind::Main, JobInfo::new(|| {})
            .named("follow-up")
            .write("r")
            .signal(f1));
        s1.schedule_job(Kind::Aux, JobInfo::new(|| {})
            .named("transfer")
            .write("r")
            .signal(t1));
    }).named("parent").write("r"));

    with_workers(&sched, Kind::Main, 1, |s| {
        with_workers(s, Kind::Aux, 1, |_| {
            assert!(follow_up.wait_timeout(TIMEOUT));
            assert!(transfer.wait_timeout(TIMEOUT));
        });
    });
    assert_eq!(sched.backend(Kind::Main).outstanding_jobs(), 0);
    assert_eq!(sched.backend(Kind::Aux).outstanding_jobs(), 0);
}

#[test]
fn release_with_queued_jobs() {
    let sched = scheduler();
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        sched.schedule_job(Kind::Aux, counting_job(&ran));
    }
    sched.release();
    assert_eq!(ran.load(SeqCst), 0);
}
