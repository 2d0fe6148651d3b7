//! Trigger scheduling.
//!
//! Each rule gets its own timer task. Wall-clock triggers are recomputed
//! from the calendar after every firing; relative triggers tick on a fixed
//! period and are gated by their hour window at firing time. Every firing
//! runs its cycle as a separate task so a slow fetch never delays another
//! timer.

mod calendar;
mod cycle;
mod engine;

pub use calendar::{next_due, ScheduleZone};
pub use cycle::{CycleOutcome, CycleRunner};
pub use engine::{is_missed, Clock, EngineSettings, ScheduleEngine, SystemClock, TimerSnapshot};
