//! Steps a particle system with the scheduler: one compute backend
//! integrates and packs chunks of particles, and a transfer backend
//! copies packed chunks into the buffers the "renderer" reads.
//!
//! `KILN_MAX_JOBS` tunes the per-backend job budget and `RUST_LOG`
//! controls logging.

use std::sync::Arc;
use std::thread::{self, Scope};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use crossbeam_channel as cc;
use enum_map::Enum;
use log::{debug, error, info};
use sched::{JobInfo, Scheduler, SchedulerConfig, Signal};

mod world;

use world::*;

const CHUNKS: usize = 16;
const PARTICLES_PER_CHUNK: usize = 2048;
const FRAMES: u32 = 120;
const COMPUTE_WORKERS: u32 = 4;
const TRANSFER_WORKERS: u32 = 1;
const DT: f32 = 1.0 / 60.0;
const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, Enum)]
enum Queue {
    Compute,
    Transfer,
}

type Sched = Scheduler<Queue, Resource>;

#[derive(Debug, Default)]
struct Stats {
    frames: u32,
    jobs: u64,
    worst_frame: Duration,
}

fn spawn_workers<'scope>(
    s: &'scope Scope<'scope, '_>,
    sched: &'scope Sched,
    queue: Queue,
    count: u32,
) -> u32 {
    for i in 0..count {
        let res = thread::Builder::new()
            .name(format!("{:?}-{}", queue, i))
            .spawn_scoped(s, move || sched.use_backend_thread(queue));
        if let Err(e) = res {
            error!("failed to spawn {:?} worker: {}", queue, e);
            return i;
        }
    }
    count
}

fn wait_for_workers(sched: &Sched, queue: Queue, count: u32) {
    while sched.backend(queue).active_workers() < count {
        thread::sleep(Duration::from_millis(1));
    }
}

/// Completion events that trigger a chunk's next stage.
#[derive(Clone, Copy, Debug)]
enum Stage {
    Integrated(usize),
    Packed(usize),
}

type Events<'a> = (&'a cc::Sender<Stage>, &'a cc::Receiver<Stage>);

/// Steps every chunk through integrate, pack and upload. Jobs only
/// order by their locks, so each stage is scheduled once the previous
/// one has completed. Returns the number of jobs run.
fn run_frame(
    sched: &Sched,
    world: &Arc<World>,
    frame: u32,
    events: Events<'_>,
) -> anyhow::Result<u64> {
    let (tx, rx) = events;
    let chunks = world.chunks();

    let w = Arc::clone(world);
    let forces = JobInfo::new(move || w.update_forces(frame))
        .named("update forces")
        .write(Resource::Forces);
    sched.schedule_job(Queue::Compute, forces);

    for chunk in 0..chunks {
        let w = Arc::clone(world);
        let tx = tx.clone();
        let integrate = JobInfo::new(move || w.integrate(chunk, DT))
            .named("integrate")
            .read(Resource::Forces)
            .write(Resource::Particles(chunk))
            .on_complete(move || {
                let _ = tx.send(Stage::Integrated(chunk));
            });
        sched.schedule_job(Queue::Compute, integrate);
    }

    let mut uploads = Vec::with_capacity(chunks);
    while uploads.len() < chunks {
        let stage = rx.recv_timeout(FRAME_TIMEOUT)
            .with_context(|| format!("frame {}: compute stalled", frame))?;
        debug!("frame {}: {:?}", frame, stage);

        match stage {
            Stage::Integrated(chunk) => {
                let w = Arc::clone(world);
                let tx = tx.clone();
                let pack = JobInfo::new(move || w.pack(chunk))
                    .named("pack")
                    .read(Resource::Particles(chunk))
                    .write(Resource::Staging(chunk))
                    .on_complete(move || {
                        let _ = tx.send(Stage::Packed(chunk));
                    });
                sched.schedule_job(Queue::Compute, pack);
            },
            // Staging buffers belong to the compute backend's lock
            // domain, so they are only handed over once packed.
            Stage::Packed(chunk) => {
                let w = Arc::clone(world);
                let done = Arc::new(Signal::new());
                let upload = JobInfo::new(move || w.upload(chunk))
                    .named("upload")
                    .read(Resource::Staging(chunk))
                    .write(Resource::Vertices(chunk))
                    .signal(Arc::clone(&done));
                sched.schedule_job(Queue::Transfer, upload);
                uploads.push(done);
            },
        }
    }

    for done in uploads {
        if !done.wait_timeout(FRAME_TIMEOUT) {
            bail!("frame {}: upload stalled", frame);
        }
    }
    Ok(1 + 3 * chunks as u64)
}

fn run(sched: &Sched, world: &Arc<World>) -> anyhow::Result<Stats> {
    let (tx, rx) = cc::unbounded();
    let mut stats = Stats::default();
    for frame in 0..FRAMES {
        let start = Instant::now();
        stats.jobs += run_frame(sched, world, frame, (&tx, &rx))?;
        stats.worst_frame = stats.worst_frame.max(start.elapsed());
        stats.frames += 1;
        if frame % 30 == 0 {
            info!("frame {}: mean height {:.3}", frame, world.mean_height());
        }
    }
    Ok(stats)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = SchedulerConfig::from_env()
        .context("invalid scheduler configuration")?;
    let sched: Sched = Scheduler::new(config)?;
    let world = Arc::new(World::new(CHUNKS, PARTICLES_PER_CHUNK));

    let start = Instant::now();
    let stats = thread::scope(|s| -> anyhow::Result<Stats> {
        let compute =
            spawn_workers(s, &sched, Queue::Compute, COMPUTE_WORKERS);
        let transfer =
            spawn_workers(s, &sched, Queue::Transfer, TRANSFER_WORKERS);
        wait_for_workers(&sched, Queue::Compute, compute);
        wait_for_workers(&sched, Queue::Transfer, transfer);

        let res = if compute == 0 || transfer == 0 {
            Err(anyhow::anyhow!("no workers available"))
        } else {
            run(&sched, &world)
        };

        sched.free_backend_threads(Queue::Compute);
        sched.free_backend_threads(Queue::Transfer);
        res
    })?;
    let elapsed = start.elapsed();

    println!("frames:      {}", stats.frames);
    println!("jobs:        {}", stats.jobs);
    println!("elapsed:     {:.2?}", elapsed);
    println!("worst frame: {:.2?}", stats.worst_frame);
    println!("jobs/sec:    {:.0}", stats.jobs as f64 / elapsed.as_secs_f64());
    println!("mean height: {:.3}", world.mean_height());

    sched.release();
    Ok(())
}
