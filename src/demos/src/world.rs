use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Resource {
    Forces,
    Particles(usize),
    Staging(usize),
    Vertices(usize),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Particle {
    pub pos: [f32; 2],
    pub vel: [f32; 2],
}

/// Simulation state, split into chunks that jobs lock individually.
///
/// Every field sits behind a lock, but jobs only ever try to take it:
/// the scheduler's resource locks already keep conflicting jobs apart,
/// so contention here means a job declared the wrong resources.
#[derive(Debug)]
pub struct World {
    pub gravity: RwLock<[f32; 2]>,
    pub particles: Vec<RwLock<Vec<Particle>>>,
    pub staging: Vec<RwLock<Vec<[f32; 2]>>>,
    pub vertices: Vec<RwLock<Vec<[f32; 2]>>>,
}

fn read<T>(resource: Resource, data: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match data.try_read() {
        Some(guard) => guard,
        None => panic!("{:?} is being written by another job", resource),
    }
}

fn write<T>(resource: Resource, data: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match data.try_write() {
        Some(guard) => guard,
        None => panic!("{:?} is in use by another job", resource),
    }
}

impl World {
    pub fn new(chunks: usize, per_chunk: usize) -> Self {
        let chunk = |c: usize| -> Vec<Particle> {
            (0..per_chunk).map(|i| {
                let t = (c * per_chunk + i) as f32;
                Particle {
                    pos: [t.sin() * 10.0, 50.0 + t.cos() * 10.0],
                    vel: [(t * 0.37).cos(), (t * 0.71).sin()],
                }
            }).collect()
        };
        let buffers = || -> Vec<RwLock<Vec<[f32; 2]>>> {
            (0..chunks).map(|_| RwLock::new(vec![[0.0; 2]; per_chunk])).collect()
        };
        World {
            gravity: RwLock::new([0.0, -9.8]),
            particles: (0..chunks).map(|c| RwLock::new(chunk(c))).collect(),
            staging: buffers(),
            vertices: buffers(),
        }
    }

    pub fn chunks(&self) -> usize {
        self.particles.len()
    }

    pub fn update_forces(&self, frame: u32) {
        let angle = frame as f32 * 0.05;
        let mut gravity = write(Resource::Forces, &self.gravity);
        *gravity = [angle.sin() * 2.0, -9.8];
    }

    pub fn integrate(&self, chunk: usize, dt: f32) {
        let gravity = *read(Resource::Forces, &self.gravity);
        let mut particles =
            write(Resource::Particles(chunk), &self.particles[chunk]);
        for p in particles.iter_mut() {
            p.vel[0] += gravity[0] * dt;
            p.vel[1] += gravity[1] * dt;
            p.pos[0] += p.vel[0] * dt;
            p.pos[1] += p.vel[1] * dt;
            // Bounce off the floor
            if p.pos[1] < 0.0 {
                p.pos[1] = -p.pos[1];
                p.vel[1] = -p.vel[1] * 0.8;
            }
        }
    }

    pub fn pack(&self, chunk: usize) {
        let particles =
            read(Resource::Particles(chunk), &self.particles[chunk]);
        let mut staging = write(Resource::Staging(chunk), &self.staging[chunk]);
        for (dst, p) in staging.iter_mut().zip(particles.iter()) {
            *dst = p.pos;
        }
    }

    pub fn upload(&self, chunk: usize) {
        let staging = read(Resource::Staging(chunk), &self.staging[chunk]);
        let mut vertices =
            write(Resource::Vertices(chunk), &self.vertices[chunk]);
        vertices.copy_from_slice(&staging);
    }

    /// Mean particle height as seen by the renderer.
    pub fn mean_height(&self) -> f32 {
        let (sum, count) = self.vertices.iter()
            .map(|chunk| {
                let chunk = chunk.read();
                (chunk.iter().map(|v| v[1]).sum::<f32>(), chunk.len())
            })
            .fold((0.0, 0), |(s, n), (cs, cn)| (s + cs, n + cn));
        if count == 0 { 0.0 } else { sum / count as f32 }
    }
}
