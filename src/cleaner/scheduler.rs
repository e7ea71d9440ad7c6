use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::CleanerConfig;
use crate::transport::ChannelId;

use super::Cleaner;

/// Lifecycle of one channel's periodic job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Stopped,
    /// Waiting for the next tick.
    Armed,
    /// A sweep is in progress.
    Running,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// One-time wait before the first firing of every job armed with it.
    pub startup_delay: Option<Duration>,
}

impl SchedulerSettings {
    pub fn from_config(config: &CleanerConfig) -> Self {
        let interval = config.interval();
        Self {
            interval,
            startup_delay: config.startup_delay.then_some(interval),
        }
    }
}

struct JobHandle {
    state: Arc<Mutex<JobState>>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl JobHandle {
    fn is_live(&self) -> bool {
        !self.task.is_finished() && !self.stop.is_cancelled()
    }
}

/// One periodic sweep job per enabled channel.
pub struct Scheduler {
    cleaner: Arc<Cleaner>,
    settings: SchedulerSettings,
    jobs: Mutex<HashMap<ChannelId, JobHandle>>,
}

impl Scheduler {
    pub fn new(cleaner: Arc<Cleaner>, settings: SchedulerSettings) -> Self {
        Self {
            cleaner,
            settings,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn cleaner(&self) -> &Arc<Cleaner> {
        &self.cleaner
    }

    /// Start the periodic job for `channel`. Returns `false` if one is already live.
    pub fn arm(&self, channel: ChannelId) -> bool {
        let mut jobs = self.lock();
        if jobs.get(&channel).is_some_and(JobHandle::is_live) {
            tracing::info!(channel = %channel, "cleaner.job.already_armed");
            return false;
        }

        let state = Arc::new(Mutex::new(JobState::Armed));
        let stop = CancellationToken::new();
        let task = tokio::spawn(run_job(
            Arc::clone(&self.cleaner),
            channel,
            self.settings.clone(),
            Arc::clone(&state),
            stop.clone(),
        ));
        jobs.insert(channel, JobHandle { state, stop, task });
        tracing::info!(
            channel = %channel,
            interval_secs = self.settings.interval.as_secs(),
            "cleaner.job.armed"
        );
        true
    }

    /// Arm every channel; returns how many jobs were newly started.
    pub fn arm_all(&self, channels: impl IntoIterator<Item = ChannelId>) -> usize {
        channels
            .into_iter()
            .filter(|channel| self.arm(*channel))
            .count()
    }

    /// Interrupt any run on `channel` and remove its job. Returns whether a job existed.
    pub fn disarm(&self, channel: ChannelId) -> bool {
        self.cleaner.registry().cancel(channel);
        let removed = self.lock().remove(&channel);
        match removed {
            Some(job) => {
                job.stop.cancel();
                tracing::info!(channel = %channel, "cleaner.job.disarmed");
                true
            }
            None => false,
        }
    }

    pub fn state(&self, channel: ChannelId) -> JobState {
        let jobs = self.lock();
        match jobs.get(&channel) {
            Some(job) if job.is_live() => *job.state.lock().unwrap_or_else(PoisonError::into_inner),
            _ => JobState::Stopped,
        }
    }

    pub fn armed_channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<_> = self
            .lock()
            .iter()
            .filter(|(_, job)| job.is_live())
            .map(|(channel, _)| *channel)
            .collect();
        channels.sort();
        channels
    }

    /// Stop every job. In-flight sweeps are aborted.
    pub fn shutdown(&self) {
        let jobs: Vec<_> = self.lock().drain().collect();
        for (channel, job) in jobs {
            job.stop.cancel();
            job.task.abort();
            tracing::debug!(channel = %channel, "cleaner.job.shutdown");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelId, JobHandle>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_state(state: &Mutex<JobState>, next: JobState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

async fn run_job(
    cleaner: Arc<Cleaner>,
    channel: ChannelId,
    settings: SchedulerSettings,
    state: Arc<Mutex<JobState>>,
    stop: CancellationToken,
) {
    if let Some(delay) = settings.startup_delay {
        tracing::debug!(channel = %channel, delay_secs = delay.as_secs(), "cleaner.job.startup_delay");
        tokio::select! {
            () = stop.cancelled() => {
                set_state(&state, JobState::Stopped);
                return;
            }
            () = time::sleep(delay) => {}
        }
    }

    let mut interval = time::interval(settings.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            _ = interval.tick() => {}
        }

        set_state(&state, JobState::Running);
        match cleaner.sweep(channel).await {
            Ok(Some(report)) => {
                tracing::info!(
                    channel = %channel,
                    deleted = report.deleted,
                    candidates = report.candidates,
                    "cleaner.sweep.finished"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "cleaner.sweep.failed");
            }
        }
        set_state(&state, JobState::Armed);
    }

    set_state(&state, JobState::Stopped);
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
