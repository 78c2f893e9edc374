use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    storage::{entities::FocusSnapshot, log_writer::SessionSink},
    utils::clock::Clock,
    window_api::FocusProbe,
};

use super::{
    classifier::ActivityClassifier,
    tracker::{Observation, SessionTracker, TrackerState},
};

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(500);
pub const DEFAULT_IDLE_CHECK_TICKS: u32 = 10;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    /// Time between two focus checks.
    pub poll_period: Duration,
    /// Idleness is queried once every this many ticks.
    pub idle_check_ticks: u32,
    /// Pause between stopping and starting again in [SamplingLoop::restart].
    pub settle_delay: Duration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            poll_period: DEFAULT_POLL_PERIOD,
            idle_check_ticks: DEFAULT_IDLE_CHECK_TICKS,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Everything a tick touches. Lives behind a single lock shared by the background task and the
/// control calls.
struct Engine<P, S> {
    probe: P,
    classifier: ActivityClassifier,
    tracker: SessionTracker,
    sink: S,
    ticks: u32,
    idle_check_ticks: u32,
}

impl<P: FocusProbe, S: SessionSink> Engine<P, S> {
    /// Forgets the open session. Anything not closed yet is lost.
    fn reset(&mut self) {
        if let Some(session) = self.tracker.state().open_session() {
            debug!("Discarding open session {:?}", session.window_title);
        }
        self.tracker = SessionTracker::new();
        self.ticks = 0;
    }

    async fn tick(&mut self, clock: &dyn Clock) -> Result<()> {
        self.ticks = self.ticks.wrapping_add(1);
        let check_idle = self.ticks % self.idle_check_ticks == 0;

        let snapshot = self.probe.probe_focus().unwrap_or_else(|e| {
            warn!("Failed to probe focus, treating it as unknown {e:?}");
            FocusSnapshot::default()
        });
        let idle = if check_idle {
            match self.probe.idle_seconds() {
                Ok(seconds) => Some(chrono::Duration::seconds(
                    seconds.min(u64::from(u32::MAX)) as i64,
                )),
                Err(e) => {
                    warn!("Failed to query idle time, skipping idle check {e:?}");
                    None
                }
            }
        } else {
            None
        };
        let activity = self
            .classifier
            .classify(&snapshot.window_title, &snapshot.process_name);

        let closed = self.tracker.observe(&Observation {
            snapshot,
            activity,
            idle,
            now: clock.now(),
        });

        for session in closed {
            let span = info_span!("Persisting session", title = %session.window_title);
            self.sink.append(&session).instrument(span).await?;
            info!(
                "Logged {:?} ({}) for {}s",
                session.window_title,
                session.category,
                session.duration().num_seconds()
            );
        }
        Ok(())
    }
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives probing, classification, segmentation and persistence on one background task.
pub struct SamplingLoop<P, S> {
    engine: Arc<Mutex<Engine<P, S>>>,
    worker: Mutex<Option<Worker>>,
    running: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    config: SamplingConfig,
}

impl<P, S> SamplingLoop<P, S>
where
    P: FocusProbe + 'static,
    S: SessionSink + 'static,
{
    pub fn new(
        probe: P,
        classifier: ActivityClassifier,
        sink: S,
        clock: Arc<dyn Clock>,
        config: SamplingConfig,
    ) -> Self {
        let idle_check_ticks = config.idle_check_ticks.max(1);
        Self {
            engine: Arc::new(Mutex::new(Engine {
                probe,
                classifier,
                tracker: SessionTracker::new(),
                sink,
                ticks: 0,
                idle_check_ticks,
            })),
            worker: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            clock,
            config,
        }
    }

    /// Spawns the background task. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|v| !v.handle.is_finished()) {
            debug!("Sampling is already running");
            return;
        }

        self.engine.lock().await.reset();

        let shutdown = CancellationToken::new();
        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(
            run(
                self.engine.clone(),
                self.clock.clone(),
                self.config.poll_period,
                shutdown.clone(),
                RunningGuard(self.running.clone()),
            )
            .instrument(info_span!("Sampling")),
        );
        *worker = Some(Worker { shutdown, handle });
        info!("Sampling started");
    }

    /// Returns once the background task has fully finished, including any write it was doing.
    /// The open session is abandoned without being logged.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(Worker { shutdown, handle }) = worker.take() else {
            return;
        };
        shutdown.cancel();
        if let Err(e) = handle.await {
            error!("Sampling task ended abnormally {e:?}");
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Sampling stopped");
    }

    pub async fn restart(&self) {
        self.stop().await;
        self.clock.sleep(self.config.settle_delay).await;
        self.start().await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current segmentation state, mostly useful for diagnostics.
    pub async fn tracker_state(&self) -> TrackerState {
        self.engine.lock().await.tracker.state().clone()
    }
}

/// Clears the running flag however the task ends, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn run<P: FocusProbe, S: SessionSink>(
    engine: Arc<Mutex<Engine<P, S>>>,
    clock: Arc<dyn Clock>,
    poll_period: Duration,
    shutdown: CancellationToken,
    _running: RunningGuard,
) {
    let mut next_tick = clock.instant();
    loop {
        next_tick += poll_period;

        {
            let mut engine = engine.lock().await;
            if let Err(e) = engine.tick(clock.as_ref()).await {
                error!("Sampling tick failed {e:?}");
            }
        }

        // After a suspend the schedule is far behind, don't replay the missed ticks.
        let now = clock.instant();
        if next_tick < now {
            next_tick = now;
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = clock.sleep_until(next_tick) => ()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        engine::classifier::ActivityClassifier,
        storage::{
            entities::{ActivitySession, FocusSnapshot, INACTIVE_CATEGORY},
            log_writer::{read_log_rows, LogWriter, SessionSink, LOG_HEADER},
        },
        utils::{clock::TokioDrivenClock, logging::TEST_LOGGING},
        window_api::{FocusProbe, MockFocusProbe},
    };

    use super::{SamplingConfig, SamplingLoop};

    /// Probe whose answers the test changes while the loop runs.
    #[derive(Clone)]
    struct ScriptedProbe {
        current: Arc<StdMutex<(FocusSnapshot, u64)>>,
    }

    impl ScriptedProbe {
        fn new(title: &str, process: &str) -> Self {
            Self {
                current: Arc::new(StdMutex::new((FocusSnapshot::new(title, process), 0))),
            }
        }

        fn focus(&self, title: &str, process: &str) {
            self.current.lock().unwrap().0 = FocusSnapshot::new(title, process);
        }

        fn idle(&self, seconds: u64) {
            self.current.lock().unwrap().1 = seconds;
        }
    }

    impl FocusProbe for ScriptedProbe {
        fn probe_focus(&mut self) -> Result<FocusSnapshot> {
            Ok(self.current.lock().unwrap().0.clone())
        }

        fn idle_seconds(&mut self) -> Result<u64> {
            Ok(self.current.lock().unwrap().1)
        }
    }

    #[derive(Clone, Default)]
    struct MemorySink {
        sessions: Arc<StdMutex<Vec<ActivitySession>>>,
    }

    impl MemorySink {
        fn sessions(&self) -> Vec<ActivitySession> {
            self.sessions.lock().unwrap().clone()
        }
    }

    impl SessionSink for MemorySink {
        async fn append(&mut self, session: &ActivitySession) -> Result<()> {
            self.sessions.lock().unwrap().push(session.clone());
            Ok(())
        }
    }

    fn clock() -> Arc<TokioDrivenClock> {
        Arc::new(TokioDrivenClock::starting_at(
            Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
        ))
    }

    fn create_loop<P: FocusProbe + 'static, S: SessionSink + 'static>(
        probe: P,
        sink: S,
    ) -> SamplingLoop<P, S> {
        SamplingLoop::new(
            probe,
            ActivityClassifier::default(),
            sink,
            clock(),
            SamplingConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_idle_scenario() -> Result<()> {
        *TEST_LOGGING;
        let probe = ScriptedProbe::new("Budget.xlsx - Excel", "EXCEL.EXE");
        let sink = MemorySink::default();
        let sampling = create_loop(probe.clone(), sink.clone());

        sampling.start().await;
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert!(sink.sessions().is_empty());

        probe.idle(400);
        tokio::time::sleep(Duration::from_secs(10)).await;
        let sessions = sink.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(&*sessions[0].details, "Budget.xlsx");
        assert_eq!(&*sessions[0].category, "Work - Office");
        let active = sessions[0].duration().num_seconds();
        assert!((900..=906).contains(&active), "{active}");
        assert!(sampling.tracker_state().await.is_idle());

        tokio::time::sleep(Duration::from_secs(340)).await;
        probe.idle(0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        let sessions = sink.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(&*sessions[1].category, INACTIVE_CATEGORY);
        let inactive = sessions[1].duration().num_seconds();
        assert!((345..=356).contains(&inactive), "{inactive}");
        assert!(sessions[0].end <= sessions[1].start);
        assert!(!sampling.tracker_state().await.is_idle());

        sampling.stop().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_switches_are_logged() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let path = dir.path().join("log.csv");
        let probe = ScriptedProbe::new("Budget.xlsx - Excel", "EXCEL.EXE");
        let sampling = create_loop(probe.clone(), LogWriter::new(path.clone()));

        sampling.start().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        probe.focus("Inbox - Outlook", "OUTLOOK.EXE");
        tokio::time::sleep(Duration::from_secs(30)).await;
        probe.focus("main.rs - crate - Visual Studio Code", "Code.exe");
        tokio::time::sleep(Duration::from_secs(30)).await;
        sampling.stop().await;

        let content = std::fs::read_to_string(&path)?;
        assert_eq!(content.lines().next(), Some(LOG_HEADER));
        let rows = read_log_rows(&path)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].details, "Budget.xlsx");
        assert_eq!(rows[1].category, "Email");
        assert!((59..=61).contains(&rows[0].duration_seconds));
        assert!((29..=31).contains(&rows[1].duration_seconds));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failures_do_not_stop_loop() -> Result<()> {
        *TEST_LOGGING;
        let mut probe = MockFocusProbe::new();
        probe
            .expect_probe_focus()
            .returning(|| Err(anyhow!("No display")));
        probe
            .expect_idle_seconds()
            .returning(|| Err(anyhow!("No display")));
        let sink = MemorySink::default();
        let sampling = create_loop(probe, sink.clone());

        sampling.start().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(sampling.is_running());
        assert!(sampling.tracker_state().await.open_session().is_some());
        sampling.stop().await;

        assert!(!sampling.is_running());
        assert!(sink.sessions().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_queried_every_tenth_tick() -> Result<()> {
        *TEST_LOGGING;
        let mut probe = MockFocusProbe::new();
        probe
            .expect_probe_focus()
            .times(20)
            .returning(|| Ok(FocusSnapshot::new("Editor", "code.exe")));
        probe.expect_idle_seconds().times(2).returning(|| Ok(0));
        let sampling = create_loop(probe, MemorySink::default());

        // Ticks at 0s, 0.5s, ..., 9.5s.
        sampling.start().await;
        tokio::time::sleep(Duration::from_millis(9750)).await;
        // An extra call would have panicked the task.
        assert!(sampling.is_running());
        sampling.stop().await;

        // Call counts are checked when the mock drops.
        drop(sampling);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_keeps_sampling() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let broken = LogWriter::new(dir.path().join("missing").join("log.csv"));
        let probe = ScriptedProbe::new("first", "a.exe");
        let sampling = create_loop(probe.clone(), broken);

        sampling.start().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        probe.focus("second", "b.exe");
        tokio::time::sleep(Duration::from_secs(5)).await;
        probe.focus("third", "c.exe");
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(sampling.is_running());
        let state = sampling.tracker_state().await;
        assert_eq!(&*state.open_session().unwrap().window_title, "third");
        sampling.stop().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_restart() -> Result<()> {
        *TEST_LOGGING;
        let probe = ScriptedProbe::new("first", "a.exe");
        let sink = MemorySink::default();
        let sampling = create_loop(probe.clone(), sink.clone());

        assert!(!sampling.is_running());
        sampling.stop().await;

        sampling.start().await;
        sampling.start().await;
        assert!(sampling.is_running());
        tokio::time::sleep(Duration::from_secs(5)).await;

        sampling.stop().await;
        assert!(!sampling.is_running());

        // The open session was abandoned and nothing is written once stopped.
        probe.focus("second", "b.exe");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sink.sessions().is_empty());

        sampling.restart().await;
        assert!(sampling.is_running());
        tokio::time::sleep(Duration::from_secs(5)).await;
        probe.focus("third", "c.exe");
        tokio::time::sleep(Duration::from_secs(1)).await;
        sampling.stop().await;

        let sessions = sink.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(&*sessions[0].window_title, "second");
        Ok(())
    }
}
