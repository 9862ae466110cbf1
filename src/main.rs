// warmpool - frame loop demo
//
// Spawns and retires projectiles through a registry-owned pool, with a
// monitor driven by the same frame clock. Events are printed as they arrive.

use std::sync::Arc;
use std::time::Duration;

use warmpool::{
    ChannelSink, MonitorConfig, PoolMonitor, PoolRegistry, PoolResult, PoolSettings, Pooled,
    PooledResource,
};

const FRAME: Duration = Duration::from_millis(16);

#[derive(Debug, Default)]
struct Projectile {
    position: f32,
    velocity: f32,
    ttl_frames: u32,
}

impl PooledResource for Projectile {
    fn on_acquire(&mut self) {
        self.position = 0.0;
        self.velocity = 12.0;
        self.ttl_frames = 20;
    }

    fn on_release(&mut self) {
        self.velocity = 0.0;
        self.ttl_frames = 0;
    }
}

fn main() -> PoolResult<()> {
    println!("=== warmpool frame loop demo ===\n");

    let (sink, events) = ChannelSink::unbounded();
    let sink = Arc::new(sink);
    let registry = Arc::new(PoolRegistry::with_sink(sink.clone()));
    let projectiles = registry.get_or_create(
        PoolSettings::new("projectiles")
            .with_initial_size(16)
            .with_max_size(48),
        Projectile::default,
    )?;
    let monitor = PoolMonitor::with_sink(
        Arc::clone(&registry),
        MonitorConfig::new()
            .with_sample_interval(Duration::from_millis(250))
            .with_thresholds(0.6, 0.85),
        sink,
    )?;

    let mut live: Vec<Pooled<Projectile>> = Vec::new();
    let mut skipped_spawns = 0;

    for frame in 0..120 {
        // Fire harder in the middle of the run to push the pool to capacity
        let burst = if (40..70).contains(&frame) { 4 } else { 1 };
        for _ in 0..burst {
            match projectiles.acquire() {
                Some(projectile) => live.push(projectile),
                None => skipped_spawns += 1,
            }
        }

        let mut still_flying = Vec::with_capacity(live.len());
        for projectile in live.drain(..) {
            let expired = {
                let mut p = projectile.lock();
                let step = p.velocity * FRAME.as_secs_f32();
                p.position += step;
                p.ttl_frames = p.ttl_frames.saturating_sub(1);
                p.ttl_frames == 0
            };
            if expired {
                projectiles.release(projectile)?;
            } else {
                still_flying.push(projectile);
            }
        }
        live = still_flying;

        if let Some(report) = monitor.tick(FRAME) {
            println!(
                "frame {frame:>3}: outstanding {:>2}, idle {:>2}, worst level {}",
                report.total_outstanding(),
                report.total_idle(),
                report.worst_level()
            );
        }
        for event in events.try_iter() {
            println!("           event: {event:?}");
        }
    }

    for projectile in live.drain(..) {
        projectiles.release(projectile)?;
    }

    let metrics = projectiles.metrics();
    println!("\nSkipped spawns: {skipped_spawns}");
    println!(
        "Peak outstanding: {} of {} (total built {})",
        metrics.peak_count, metrics.max_size, metrics.total_count
    );

    let destroyed = registry.clear_all();
    println!("Cleared {destroyed} projectiles at shutdown");
    Ok(())
}
