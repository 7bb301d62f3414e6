//! Fuzz campaign orchestration
//!
//! The campaign is a strictly sequential loop: draw an input, verify it,
//! record the result, pace, repeat. Stop conditions and the cancel flag are
//! checked once per iteration before the next input is drawn, so a running
//! transaction always finishes and the statistics stay consistent.

use crate::error::HarnessError;
use crate::keys::KeystrokeGenerator;
use crate::stats::RunStatistics;
use crate::transport::Transport;
use crate::verify::TransactionVerifier;
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Idle,
    Running,
    /// A duration or count bound was reached
    Completed,
    /// Stopped early through the cancel flag
    Interrupted,
}

/// Duration and/or count bound; at least one is required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopCondition {
    max_duration: Option<Duration>,
    max_count: Option<u64>,
}

impl StopCondition {
    pub fn new(max_duration: Option<Duration>, max_count: Option<u64>) -> Result<Self, HarnessError> {
        if max_duration.is_none() && max_count.is_none() {
            return Err(HarnessError::Usage(
                "either a duration or a count bound is required".to_string(),
            ));
        }
        Ok(Self {
            max_duration,
            max_count,
        })
    }

    pub fn duration(d: Duration) -> Self {
        Self {
            max_duration: Some(d),
            max_count: None,
        }
    }

    pub fn count(n: u64) -> Self {
        Self {
            max_duration: None,
            max_count: Some(n),
        }
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }

    pub fn max_count(&self) -> Option<u64> {
        self.max_count
    }

    /// Whether the loop must stop before sending another input
    pub fn reached(&self, elapsed: Duration, sent: u64) -> bool {
        self.max_duration.is_some_and(|d| elapsed >= d) || self.max_count.is_some_and(|n| sent >= n)
    }
}

/// Cooperative cancellation shared with a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Loop settings
#[derive(Debug, Clone)]
pub struct CampaignSettings {
    pub stop: StopCondition,
    /// Fixed pause after every transaction
    pub delay: Duration,
    /// Upper bound of an extra random pause
    pub jitter: Duration,
    /// Report progress every N transactions (0 disables)
    pub progress_every: u64,
}

impl CampaignSettings {
    pub fn new(stop: StopCondition) -> Self {
        Self {
            stop,
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
            progress_every: 10,
        }
    }
}

type ProgressFn = Box<dyn FnMut(&RunStatistics)>;

/// Generate -> verify -> record loop
pub struct FuzzCampaign {
    settings: CampaignSettings,
    generator: KeystrokeGenerator,
    verifier: TransactionVerifier,
    cancel: CancelFlag,
    state: CampaignState,
    progress: Option<ProgressFn>,
}

impl FuzzCampaign {
    pub fn new(
        settings: CampaignSettings,
        generator: KeystrokeGenerator,
        verifier: TransactionVerifier,
    ) -> Self {
        Self {
            settings,
            generator,
            verifier,
            cancel: CancelFlag::new(),
            state: CampaignState::Idle,
            progress: None,
        }
    }

    /// Use an externally owned cancel flag (e.g. one set from Ctrl-C)
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called every `progress_every` transactions
    pub fn on_progress(mut self, f: impl FnMut(&RunStatistics) + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    pub fn seed(&self) -> u64 {
        self.generator.seed()
    }

    /// Run until a bound is reached or the cancel flag is set
    pub fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        stats: &mut RunStatistics,
    ) -> CampaignState {
        self.state = CampaignState::Running;
        let started = Instant::now();
        let mut sent: u64 = 0;

        info!(
            "Campaign started: strategy={} seed={} bounds={:?}/{:?}",
            self.generator.strategy_name(),
            self.generator.seed(),
            self.settings.stop.max_duration(),
            self.settings.stop.max_count(),
        );

        loop {
            if self.cancel.is_cancelled() {
                self.state = CampaignState::Interrupted;
                break;
            }
            if self.settings.stop.reached(started.elapsed(), sent) {
                self.state = CampaignState::Completed;
                break;
            }

            let input = self.generator.next_input();
            let tx = self.verifier.verify(transport, input);
            stats.record(&tx);
            sent += 1;

            if self.settings.progress_every > 0 && sent % self.settings.progress_every == 0 {
                debug!(
                    "progress: {} inputs, {:.1}% success, {} failures",
                    stats.total(),
                    stats.success_rate(),
                    stats.failures()
                );
                if let Some(progress) = self.progress.as_mut() {
                    progress(stats);
                }
            }

            self.pace();
        }

        info!(
            "Campaign {:?} after {} inputs in {:.1}s",
            self.state,
            sent,
            started.elapsed().as_secs_f64()
        );
        self.state
    }

    /// Run, then release the transport on every exit path
    pub fn execute<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        stats: &mut RunStatistics,
    ) -> CampaignState {
        let mut guard = CloseOnDrop(transport);
        let state = self.run(&mut *guard.0, stats);
        drop(guard);
        state
    }

    fn pace(&self) {
        let mut pause = self.settings.delay;
        if !self.settings.jitter.is_zero() {
            pause += rand::thread_rng().gen_range(Duration::ZERO..=self.settings.jitter);
        }
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }
}

struct CloseOnDrop<'a, T: Transport + ?Sized>(&'a mut T);

impl<T: Transport + ?Sized> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            warn!("Failed to close transport: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{FamilyWeights, KeystrokeEncoder, WeightedFamilies};
    use crate::transport::ScriptedTransport;
    use crate::verify::VerifierSettings;
    use std::cell::Cell;
    use std::rc::Rc;

    fn campaign(stop: StopCondition) -> FuzzCampaign {
        let strategy = Box::new(WeightedFamilies::new(&FamilyWeights::default()).unwrap());
        let generator = KeystrokeGenerator::new(KeystrokeEncoder::default(), strategy, Some(1));
        let verifier = TransactionVerifier::new(VerifierSettings {
            deadline: Duration::from_millis(20),
            settle: Duration::ZERO,
            ..VerifierSettings::default()
        });
        FuzzCampaign::new(CampaignSettings::new(stop), generator, verifier)
    }

    #[test]
    fn missing_bounds_is_usage_error() {
        assert!(matches!(StopCondition::new(None, None), Err(HarnessError::Usage(_))));
        assert!(StopCondition::new(Some(Duration::from_secs(1)), None).is_ok());
        assert!(StopCondition::new(None, Some(5)).is_ok());
    }

    #[test]
    fn stop_condition_whichever_first() {
        let stop = StopCondition::new(Some(Duration::from_secs(10)), Some(3)).unwrap();
        assert!(!stop.reached(Duration::from_secs(1), 2));
        assert!(stop.reached(Duration::from_secs(1), 3));
        assert!(stop.reached(Duration::from_secs(10), 0));
    }

    #[test]
    fn count_bound_sends_exactly_count() {
        let mut c = campaign(StopCondition::count(25));
        let mut t = ScriptedTransport::echo_scancode();
        let mut stats = RunStatistics::new();
        assert_eq!(c.state(), CampaignState::Idle);

        let state = c.run(&mut t, &mut stats);
        assert_eq!(state, CampaignState::Completed);
        assert_eq!(stats.total(), 25);
        assert_eq!(t.written().len(), 25);
    }

    #[test]
    fn zero_duration_sends_at_most_one() {
        let mut c = campaign(StopCondition::duration(Duration::ZERO));
        let mut t = ScriptedTransport::echo_scancode();
        let mut stats = RunStatistics::new();
        let state = c.run(&mut t, &mut stats);
        assert_eq!(state, CampaignState::Completed);
        assert!(stats.total() <= 1);
    }

    #[test]
    fn pre_cancelled_campaign_is_interrupted() {
        let mut c = campaign(StopCondition::count(1_000));
        c.cancel_flag().cancel();
        let mut t = ScriptedTransport::echo_scancode();
        let mut stats = RunStatistics::new();
        assert_eq!(c.run(&mut t, &mut stats), CampaignState::Interrupted);
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn cancel_mid_run_keeps_consistent_stats() {
        let flag = CancelFlag::new();
        let trigger = flag.clone();
        let mut c = campaign(StopCondition::count(10_000))
            .with_cancel_flag(flag)
            .on_progress(move |stats| {
                if stats.total() >= 30 {
                    trigger.cancel();
                }
            });
        let mut t = ScriptedTransport::echo_scancode();
        let mut stats = RunStatistics::new();

        assert_eq!(c.run(&mut t, &mut stats), CampaignState::Interrupted);
        assert_eq!(stats.total(), 30);
        assert_eq!(stats.total(), stats.categories().total());
    }

    #[test]
    fn progress_called_every_n() {
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let mut c = campaign(StopCondition::count(35)).on_progress(move |_| seen.set(seen.get() + 1));
        let mut t = ScriptedTransport::echo_scancode();
        let mut stats = RunStatistics::new();
        c.run(&mut t, &mut stats);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn execute_closes_transport() {
        let mut c = campaign(StopCondition::count(3));
        let mut t = ScriptedTransport::echo_scancode();
        let mut stats = RunStatistics::new();
        c.execute(&mut t, &mut stats);
        assert!(t.is_closed());
        assert_eq!(stats.total(), 3);
    }
}
