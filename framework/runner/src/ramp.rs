use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gangway_core::prelude::{DelegatedShutdownListener, ShutdownHandle};

use crate::stage::StageSchedule;

/// What the ramp scheduler saw and did at one adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSample {
    pub elapsed: Duration,
    pub target: usize,
    pub active: usize,
}

pub type RampObserver = Arc<dyn Fn(RampSample) + Send + Sync>;

/// Starts a virtual user thread. Receives the new user's id and a listener that fires when the
/// scheduler wants that user to stop.
pub(crate) type SpawnVirtualUser =
    dyn FnMut(u64, DelegatedShutdownListener) -> std::io::Result<JoinHandle<()>>;

/// The outcome of a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RampStats {
    pub peak_active: usize,
    pub started: u64,
}

struct VirtualUserHandle {
    id: u64,
    stop: ShutdownHandle,
    thread: JoinHandle<()>,
}

/// Keeps the number of running virtual users equal to the schedule's target.
///
/// Adjustments happen every `interval` and at every stage boundary. Scaling up starts new users.
/// Scaling down asks the most recently started users to stop once they finish their current
/// iteration. Users that are stopping no longer count as active.
pub(crate) struct RampScheduler<'a> {
    schedule: StageSchedule,
    interval: Duration,
    spawn_vu: &'a mut SpawnVirtualUser,
    observer: Option<RampObserver>,
    active_gauge: Arc<AtomicUsize>,
    next_id: u64,
    active: Vec<VirtualUserHandle>,
    draining: Vec<VirtualUserHandle>,
    peak_active: usize,
}

impl<'a> RampScheduler<'a> {
    pub(crate) fn new(
        schedule: StageSchedule,
        interval: Duration,
        spawn_vu: &'a mut SpawnVirtualUser,
    ) -> Self {
        Self {
            schedule,
            interval: interval.max(Duration::from_millis(1)),
            spawn_vu,
            observer: None,
            active_gauge: Arc::new(AtomicUsize::new(0)),
            next_id: 1,
            active: Vec::new(),
            draining: Vec::new(),
            peak_active: 0,
        }
    }

    pub(crate) fn with_observer(mut self, observer: Option<RampObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub(crate) fn with_active_gauge(mut self, active_gauge: Arc<AtomicUsize>) -> Self {
        self.active_gauge = active_gauge;
        self
    }

    /// Follow the schedule until it ends or `run_shutdown` is triggered, then stop every virtual
    /// user and wait for all of them to exit.
    pub(crate) fn run(mut self, run_shutdown: &ShutdownHandle) -> RampStats {
        let start = Instant::now();
        let total = self.schedule.total_duration();
        let boundaries = self.schedule.boundaries();

        loop {
            if run_shutdown.is_shutdown() {
                log::info!("Run stopped before the schedule finished");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }

            self.reap_finished();

            let target = self.schedule.target_at(elapsed);
            self.adjust(target);

            if let Some(observer) = &self.observer {
                observer(RampSample {
                    elapsed,
                    target,
                    active: self.active.len(),
                });
            }

            let next_boundary = boundaries
                .iter()
                .copied()
                .find(|boundary| *boundary > elapsed)
                .unwrap_or(total);
            let wake_at = (elapsed + self.interval).min(next_boundary).min(total);
            sleep_until(start + wake_at, run_shutdown);
        }

        // Users pause at their next think time and finish the step they are on.
        run_shutdown.shutdown();
        for vu in self.active.drain(..) {
            vu.stop.shutdown();
            self.draining.push(vu);
        }
        self.active_gauge.store(0, Ordering::Relaxed);

        log::debug!("Waiting for {} virtual users to stop", self.draining.len());
        for vu in self.draining.drain(..) {
            join(vu);
        }

        RampStats {
            peak_active: self.peak_active,
            started: self.next_id - 1,
        }
    }

    fn adjust(&mut self, target: usize) {
        let active = self.active.len();

        if active < target {
            for _ in active..target {
                let id = self.next_id;
                let stop = ShutdownHandle::new();
                match (self.spawn_vu)(id, stop.new_listener()) {
                    Ok(thread) => {
                        self.next_id += 1;
                        self.active.push(VirtualUserHandle { id, stop, thread });
                    }
                    Err(e) => {
                        log::error!("Failed to start virtual user {id}: {e:?}");
                        break;
                    }
                }
            }
        } else if active > target {
            for _ in target..active {
                if let Some(vu) = self.active.pop() {
                    log::debug!("Asking virtual user {} to stop", vu.id);
                    vu.stop.shutdown();
                    self.draining.push(vu);
                }
            }
        }

        self.peak_active = self.peak_active.max(self.active.len());
        self.active_gauge.store(self.active.len(), Ordering::Relaxed);
    }

    /// Join users that have exited. A user that exits without being asked to, for example after
    /// bailing, frees its slot and is replaced on this adjustment.
    fn reap_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.draining)
            .into_iter()
            .partition(|vu| vu.thread.is_finished());
        self.draining = running;
        finished.into_iter().for_each(join);

        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|vu| vu.thread.is_finished());
        self.active = running;
        for vu in finished {
            log::info!("Virtual user {} exited on its own", vu.id);
            join(vu);
        }
    }
}

fn join(vu: VirtualUserHandle) {
    if vu.thread.join().is_err() {
        log::error!("Virtual user {} panicked", vu.id);
    }
}

/// Sleep until `deadline`, waking early if the run is stopped.
fn sleep_until(deadline: Instant, run_shutdown: &ShutdownHandle) {
    const SLICE: Duration = Duration::from_millis(50);

    loop {
        if run_shutdown.is_shutdown() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    /// A virtual user that loops until asked to stop, like the real runner does.
    fn looping_vu(
        started: Arc<Mutex<Vec<u64>>>,
    ) -> impl FnMut(u64, DelegatedShutdownListener) -> std::io::Result<JoinHandle<()>> {
        move |id, stop| {
            started.lock().unwrap().push(id);
            std::thread::Builder::new().spawn(move || {
                while !stop.should_shutdown() {
                    std::thread::sleep(ms(2));
                }
            })
        }
    }

    #[test]
    fn active_count_follows_target() {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let started = Arc::new(Mutex::new(Vec::new()));
        let schedule = StageSchedule::new(vec![
            Stage::new(ms(200), 6),
            Stage::new(ms(200), 6),
            Stage::new(ms(200), 0),
        ])
        .unwrap();

        let observer_samples = samples.clone();
        let mut spawn = looping_vu(started.clone());
        let stats = RampScheduler::new(schedule.clone(), ms(10), &mut spawn)
            .with_observer(Some(Arc::new(move |sample: RampSample| {
                observer_samples.lock().unwrap().push(sample)
            })))
            .run(&ShutdownHandle::new());

        let samples = samples.lock().unwrap();
        assert!(samples.len() > 10);
        for sample in samples.iter() {
            assert_eq!(sample.target, sample.active);
            assert_eq!(schedule.target_at(sample.elapsed), sample.target);
        }
        assert_eq!(6, stats.peak_active);
        assert!(samples.iter().any(|sample| sample.active == 6));

        let started = started.lock().unwrap();
        assert_eq!(6, started.len());
        assert_eq!(vec![1, 2, 3, 4, 5, 6], *started);
        assert_eq!(6, stats.started);
    }

    #[test]
    fn zero_length_stage_jumps_immediately() {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let schedule =
            StageSchedule::new(vec![Stage::new(Duration::ZERO, 3), Stage::new(ms(100), 3)])
                .unwrap();

        let observer_samples = samples.clone();
        let mut spawn = looping_vu(Arc::new(Mutex::new(Vec::new())));
        RampScheduler::new(schedule, ms(10), &mut spawn)
            .with_observer(Some(Arc::new(move |sample: RampSample| {
                observer_samples.lock().unwrap().push(sample)
            })))
            .run(&ShutdownHandle::new());

        let samples = samples.lock().unwrap();
        assert_eq!(3, samples[0].active);
    }

    #[test]
    fn replaces_users_that_exit_on_their_own() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let schedule = StageSchedule::new(vec![Stage::new(Duration::ZERO, 2), Stage::new(ms(150), 2)]).unwrap();

        let spawn_started = started.clone();
        let mut spawn = move |id: u64, _stop: DelegatedShutdownListener| {
            spawn_started.lock().unwrap().push(id);
            std::thread::Builder::new().spawn(|| {})
        };
        let stats = RampScheduler::new(schedule, ms(10), &mut spawn).run(&ShutdownHandle::new());

        assert!(stats.started > 2);
        assert_eq!(2, stats.peak_active);
    }

    #[test]
    fn run_shutdown_ends_early() {
        let run_shutdown = ShutdownHandle::new();
        let schedule = StageSchedule::new(vec![Stage::new(Duration::from_secs(60), 2)]).unwrap();

        let stopper = run_shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(ms(100));
            stopper.shutdown();
        });

        let start = Instant::now();
        let mut spawn = looping_vu(Arc::new(Mutex::new(Vec::new())));
        RampScheduler::new(schedule, ms(10), &mut spawn).run(&run_shutdown);

        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
