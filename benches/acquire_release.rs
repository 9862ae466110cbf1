use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use warmpool::*;

#[derive(Default)]
struct Particle {
    position: [f32; 3],
    alive: bool,
}

impl PooledResource for Particle {
    fn on_acquire(&mut self) {
        self.alive = true;
    }

    fn on_release(&mut self) {
        self.position = [0.0; 3];
        self.alive = false;
    }
}

fn quiet_pool(initial: usize, max: usize) -> ObjectPool<Particle> {
    ObjectPool::with_sink(
        Particle::default,
        PoolSettings::new("particles").with_initial_size(initial).with_max_size(max),
        Arc::new(|_: &PoolEvent| {}),
    )
    .unwrap()
}

fn acquire_release(c: &mut Criterion) {
    c.bench_function("warm_acquire_release", |b| {
        let pool = quiet_pool(1024, 1024);
        b.iter(|| {
            let particle = black_box(pool.acquire().unwrap());
            pool.release(particle).unwrap();
        })
    });
    c.bench_function("lease", |b| {
        let pool = Arc::new(quiet_pool(1024, 1024));
        b.iter(|| {
            let lease = black_box(pool.lease().unwrap());
            black_box(lease.lock().alive)
        })
    });
    c.bench_function("system", |b| {
        b.iter(|| {
            let particle = black_box(Box::new(Particle::default()));
            black_box(particle.alive)
        })
    });
}

fn frame_burst(c: &mut Criterion) {
    c.bench_function("frame_burst_256", |b| {
        let pool = quiet_pool(256, 256);
        let mut live = Vec::with_capacity(256);
        b.iter(|| {
            live.extend((0..256).filter_map(|_| pool.acquire()));
            for particle in live.drain(..) {
                pool.release(particle).unwrap();
            }
        })
    });
}

criterion_group!(benches, acquire_release, frame_burst);
criterion_main!(benches);
