//! Timer ownership and firing

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::calendar::{next_due, ScheduleZone};
use super::cycle::CycleRunner;
use crate::alerting::RepeatGate;
use crate::config::{ConfigError, ScheduleConfig};
use crate::error::{Error, Result};
use crate::models::{AlertRule, AlertRuleSet};

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Engine timing settings
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Zone for wall-clock triggers and hour windows
    pub zone: ScheduleZone,
    /// Maximum lateness before a wall-clock firing is dropped
    pub misfire_grace: Duration,
    /// How long `stop` waits for in-flight cycles
    pub shutdown_grace: Duration,
}

impl From<&ScheduleConfig> for EngineSettings {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            zone: config.timezone,
            misfire_grace: config.misfire_grace,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

/// A registered timer and its next due instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    /// Rule name
    pub rule: String,
    /// Next due instant, if scheduled
    pub next_fire: Option<DateTime<Utc>>,
}

struct TimerSlot {
    rule: AlertRule,
    next_fire: Mutex<Option<DateTime<Utc>>>,
    gate: Mutex<RepeatGate>,
}

/// Owns one timer per rule and runs a cycle at each due instant
pub struct ScheduleEngine {
    slots: Vec<Arc<TimerSlot>>,
    runner: Arc<CycleRunner>,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    timers: Vec<JoinHandle<()>>,
}

impl ScheduleEngine {
    /// Create an engine for a rule set using the system clock
    pub fn new(
        rules: &AlertRuleSet,
        runner: CycleRunner,
        settings: EngineSettings,
    ) -> Result<Self> {
        Self::with_clock(rules, runner, settings, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit clock
    pub fn with_clock(
        rules: &AlertRuleSet,
        runner: CycleRunner,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        rules.validate().map_err(ConfigError::Invalid)?;

        let slots = rules
            .iter()
            .map(|rule| {
                Arc::new(TimerSlot {
                    rule: rule.clone(),
                    next_fire: Mutex::new(None),
                    gate: Mutex::new(RepeatGate::new(rule.suppress_repeats)),
                })
            })
            .collect();

        Ok(Self {
            slots,
            runner: Arc::new(runner),
            settings,
            clock,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            timers: Vec::new(),
        })
    }

    /// Spawn every timer
    pub fn start(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::schedule("engine has been stopped"));
        }
        if !self.timers.is_empty() {
            return Err(Error::schedule("engine already started"));
        }

        for slot in &self.slots {
            let timer = Timer {
                slot: Arc::clone(slot),
                runner: Arc::clone(&self.runner),
                clock: Arc::clone(&self.clock),
                settings: self.settings,
                cancel: self.cancel.child_token(),
                tracker: self.tracker.clone(),
            };
            self.timers.push(tokio::spawn(timer.run()));
        }

        info!(timers = self.timers.len(), zone = %self.settings.zone, "Schedule engine started");
        Ok(())
    }

    /// Whether timers are live
    pub fn is_running(&self) -> bool {
        !self.timers.is_empty() && !self.cancel.is_cancelled()
    }

    /// Registered timers and their next-fire instants, in rule order
    pub fn next_fire_times(&self) -> Vec<TimerSnapshot> {
        self.slots
            .iter()
            .map(|slot| TimerSnapshot {
                rule: slot.rule.name.clone(),
                next_fire: *slot.next_fire.lock(),
            })
            .collect()
    }

    /// Next due instants as if the engine started now
    pub fn preview(&self) -> Vec<TimerSnapshot> {
        let now = self.clock.now();
        self.slots
            .iter()
            .map(|slot| TimerSnapshot {
                rule: slot.rule.name.clone(),
                next_fire: first_due(&slot.rule, now, self.settings.zone),
            })
            .collect()
    }

    /// Cancel all timers and wait for in-flight cycles up to the shutdown grace
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for timer in self.timers.drain(..) {
            let _ = timer.await;
        }

        self.tracker.close();
        if tokio::time::timeout(self.settings.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                pending = self.tracker.len(),
                grace = %humantime::format_duration(self.settings.shutdown_grace),
                "In-flight cycles still running at shutdown"
            );
        }

        info!("Schedule engine stopped");
    }
}

impl Drop for ScheduleEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn first_due(rule: &AlertRule, now: DateTime<Utc>, zone: ScheduleZone) -> Option<DateTime<Utc>> {
    match rule.trigger.period() {
        Some(period) => chrono::Duration::from_std(period)
            .ok()
            .and_then(|p| now.checked_add_signed(p)),
        None => next_due(&rule.trigger, now, zone),
    }
}

/// Whether a wake-up at `now` is too late to run the firing due at `due`
pub fn is_missed(due: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> bool {
    (now - due).to_std().map_or(false, |late| late > grace)
}

struct Timer {
    slot: Arc<TimerSlot>,
    runner: Arc<CycleRunner>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Timer {
    async fn run(self) {
        match self.slot.rule.trigger.period() {
            Some(period) => self.run_interval(period).await,
            None => self.run_absolute().await,
        }
        *self.slot.next_fire.lock() = None;
    }

    async fn run_absolute(&self) {
        let rule = &self.slot.rule;
        let mut reference = self.clock.now();

        loop {
            let Some(due) = next_due(&rule.trigger, reference, self.settings.zone) else {
                warn!(rule = %rule.name, "Trigger has no future due instant");
                return;
            };
            *self.slot.next_fire.lock() = Some(due);

            let wait = (due - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(wait) => {}
            }

            let now = self.clock.now();
            if now < due {
                // woke early or the wall clock was set back
                continue;
            }

            if is_missed(due, now, self.settings.misfire_grace) {
                warn!(rule = %rule.name, %due, %now, "Missed firing, not backfilled");
            } else {
                info!(rule = %rule.name, %due, "Trigger fired");
                self.fire();
            }
            reference = now;
        }
    }

    async fn run_interval(&self, period: Duration) {
        let rule = &self.slot.rule;
        let step = chrono::Duration::from_std(period).ok();
        let advance = |from: DateTime<Utc>| step.and_then(|s| from.checked_add_signed(s));

        let Some(first) = Instant::now().checked_add(period) else {
            error!(
                rule = %rule.name,
                period = ?period,
                "Interval period out of range, timer not started"
            );
            return;
        };
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        *self.slot.next_fire.lock() = advance(self.clock.now());

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let now = self.clock.now();
            *self.slot.next_fire.lock() = advance(now);

            if let Some(window) = rule.trigger.window() {
                let hour = self.settings.zone.hour(now);
                if !window.contains(hour) {
                    debug!(rule = %rule.name, hour, "Outside time window, skipping cycle");
                    continue;
                }
            }

            info!(rule = %rule.name, "Interval trigger fired");
            self.fire();
        }
    }

    fn fire(&self) {
        let slot = Arc::clone(&self.slot);
        let runner = Arc::clone(&self.runner);
        self.tracker.spawn(async move {
            let outcome = runner.run(&slot.rule, &slot.gate).await;
            debug!(rule = %slot.rule.name, ?outcome, "Cycle finished");
        });
    }
}
