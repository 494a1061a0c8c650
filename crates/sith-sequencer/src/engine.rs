//! [`SequenceEngine`] – polled playback of a [`SequencePlan`] on the servo bank.
//!
//! The engine owns no thread.  The caller polls [`SequenceEngine::update`] at
//! whatever rate it likes (at least as often as the shortest step wait); each
//! poll applies at most one step.
//!
//! # State machine
//!
//! ```text
//!   Stopped ──start──▶ Running ──pause──▶ Paused
//!      ▲                │  ▲                │
//!      │                │  └────resume──────┘
//!      └──────stop──────┤
//!                       └──last step applied──▶ Completed ──start──▶ Running
//! ```
//!
//! Each step's wait starts when the previous step was *applied*, not at its
//! ideal scheduled time, so slow polling stretches the whole plan.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sith_hal::{HalRegistry, Servos};
use sith_types::{SithError, pulse};
use tracing::{Span, debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::plan::{SequencePlan, SequenceStep};

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Running,
    Paused,
    Completed,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Running => "running",
            PlaybackState::Paused => "paused",
            PlaybackState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Snapshot returned by [`SequenceEngine::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub current_step: usize,
    pub total_steps: usize,
    /// `current_step / total_steps`, `0.0` without a plan.
    pub progress: f64,
}

/// Handle for [`SequenceEngine::remove_completion_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

pub type CompletionCallback = Box<dyn FnMut() -> Result<(), SithError> + Send>;

// ─────────────────────────────────────────────────────────────────────────────
// SequenceEngine
// ─────────────────────────────────────────────────────────────────────────────

pub struct SequenceEngine<C: Clock = SystemClock> {
    plan: Option<SequencePlan>,
    state: PlaybackState,
    cursor: usize,
    /// When the current step's wait began.
    wait_start_ms: u64,
    paused_at_ms: u64,
    callbacks: Vec<(CallbackId, CompletionCallback)>,
    next_callback_id: u64,
    clock: C,
    span: Span,
}

impl SequenceEngine<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for SequenceEngine<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SequenceEngine<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            plan: None,
            state: PlaybackState::Stopped,
            cursor: 0,
            wait_start_ms: 0,
            paused_at_ms: 0,
            callbacks: Vec::new(),
            next_callback_id: 0,
            clock,
            span: tracing::info_span!("sequencer"),
        }
    }

    /// Log inside `span` instead of the default `sequencer` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    // ── Plan ─────────────────────────────────────────────────────────────────

    /// Replace the loaded plan.  Playback is reset to `Stopped` at step 0.
    pub fn load_plan(&mut self, plan: SequencePlan) {
        let _enter = self.span.enter();
        info!(name = plan.name(), steps = plan.len(), "sequence loaded");
        self.plan = Some(plan);
        self.state = PlaybackState::Stopped;
        self.cursor = 0;
    }

    /// Load a plan file.  On failure the previously loaded plan stays active.
    pub fn load_file(&mut self, path: &Path) -> Result<(), SithError> {
        match SequencePlan::load_file(path) {
            Ok(plan) => {
                self.load_plan(plan);
                Ok(())
            }
            Err(e) => {
                let _enter = self.span.enter();
                error!(path = %path.display(), error = %e, "failed to load sequence");
                Err(e)
            }
        }
    }

    pub fn plan(&self) -> Option<&SequencePlan> {
        self.plan.as_ref()
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// Begin playback from step 0.  Returns `false` without a (non-empty)
    /// plan or while already running.
    pub fn start(&mut self) -> bool {
        let _enter = self.span.enter();
        let Some(plan) = self.plan.as_ref().filter(|p| !p.is_empty()) else {
            warn!("start requested without a sequence loaded");
            return false;
        };
        if self.state == PlaybackState::Running {
            warn!(name = plan.name(), "sequence already running");
            return false;
        }
        info!(name = plan.name(), steps = plan.len(), "sequence started");
        self.cursor = 0;
        self.state = PlaybackState::Running;
        self.wait_start_ms = self.clock.now_ms();
        true
    }

    /// Stop immediately and rewind to step 0.  The plan stays loaded.
    pub fn stop(&mut self) {
        let _enter = self.span.enter();
        if self.state != PlaybackState::Stopped {
            info!(step = self.cursor, "sequence stopped");
        }
        self.state = PlaybackState::Stopped;
        self.cursor = 0;
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        let _enter = self.span.enter();
        self.state = PlaybackState::Paused;
        self.paused_at_ms = self.clock.now_ms();
        info!(step = self.cursor, "sequence paused");
    }

    /// Continue from where [`pause`](Self::pause) left off.  The time already
    /// waited on the current step still counts.
    pub fn resume(&mut self) {
        if self.state != PlaybackState::Paused {
            return;
        }
        let _enter = self.span.enter();
        let paused_for = self.clock.now_ms().saturating_sub(self.paused_at_ms);
        self.wait_start_ms = self.wait_start_ms.saturating_add(paused_for);
        self.state = PlaybackState::Running;
        info!(step = self.cursor, paused_for_ms = paused_for, "sequence resumed");
    }

    // ── Polling ──────────────────────────────────────────────────────────────

    /// Advance playback.  Applies the current step once its wait has
    /// elapsed; completes (and fires callbacks) once the last step is
    /// applied.  A no-op unless `Running`.
    pub fn update(&mut self, hal: &mut HalRegistry) {
        if self.state != PlaybackState::Running {
            return;
        }
        let Some(plan) = self.plan.as_ref() else {
            return;
        };
        let _enter = self.span.enter();
        let total = plan.len();

        if let Some(step) = plan.step(self.cursor) {
            let now = self.clock.now_ms();
            if now.saturating_sub(self.wait_start_ms) < step.offset_ms {
                return;
            }
            apply_step(step, self.cursor, hal);
            self.cursor += 1;
            self.wait_start_ms = now;
        }

        if self.cursor >= total {
            self.state = PlaybackState::Completed;
            info!(steps = total, "sequence completed");
            fire_completion(&mut self.callbacks);
        }
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Index of the next step to apply.
    pub fn current_step(&self) -> usize {
        self.cursor
    }

    pub fn status(&self) -> PlaybackStatus {
        let total_steps = self.plan.as_ref().map_or(0, SequencePlan::len);
        let progress = if total_steps == 0 {
            0.0
        } else {
            self.cursor as f64 / total_steps as f64
        };
        PlaybackStatus {
            state: self.state,
            current_step: self.cursor,
            total_steps,
            progress,
        }
    }

    // ── Completion callbacks ─────────────────────────────────────────────────

    /// Register `callback` to run, in registration order, each time a
    /// playback completes.  A failing or panicking callback is logged and
    /// does not stop the others.
    pub fn add_completion_callback(
        &mut self,
        callback: impl FnMut() -> Result<(), SithError> + Send + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.next_callback_id);
        self.next_callback_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove_completion_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Step application
// ─────────────────────────────────────────────────────────────────────────────

fn apply_step(step: &SequenceStep, index: usize, hal: &mut HalRegistry) {
    let servos = match hal.servos_mut() {
        Ok(servos) => servos,
        Err(e) => {
            warn!(step = index, error = %e, "servo bank unavailable; skipping step");
            return;
        }
    };
    debug!(step = index, label = %step.label, "applying step");

    let count = servos.channel_count();
    for (i, &value) in step.channel_values.iter().enumerate() {
        let channel = i + 1;
        if channel > count {
            break;
        }
        if !step.channel_range.contains(channel) {
            continue;
        }
        if let Err(e) = apply_channel(servos, channel, value, step.speed_limit) {
            warn!(step = index, channel, error = %e, "servo command failed");
        }
    }
}

fn apply_channel(
    servos: &mut dyn Servos,
    channel: usize,
    value: i32,
    speed_limit: Option<i32>,
) -> Result<(), SithError> {
    if value == pulse::NO_PULSE {
        return servos.stop_channel(channel);
    }
    if let Some(speed) = speed_limit
        && speed > 0
    {
        servos.set_speed(channel, speed)?;
    }
    servos.set_position(channel, value)
}

fn fire_completion(callbacks: &mut [(CallbackId, CompletionCallback)]) {
    for (id, callback) in callbacks.iter_mut() {
        let failure = match catch_unwind(AssertUnwindSafe(|| callback())) {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => SithError::CallbackFailure(e.to_string()),
            Err(payload) => SithError::CallbackFailure(panic_message(payload.as_ref())),
        };
        error!(callback = id.0, error = %failure, "completion callback failed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::plan::{PlanDocument, StepDocument};
    use sith_hal::sim::{CommandLog, SimBackend};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn step(time_ms: u64, positions: &[i32]) -> StepDocument {
        StepDocument {
            time_ms,
            servo_positions: positions.to_vec(),
            speed: None,
            start_servo: None,
            end_servo: None,
            description: String::new(),
        }
    }

    fn plan(steps: Vec<StepDocument>) -> SequencePlan {
        SequencePlan::from_document(PlanDocument {
            name: "test".to_string(),
            description: String::new(),
            steps,
        })
        .unwrap()
    }

    fn scenario_plan() -> SequencePlan {
        plan(vec![
            step(100, &[2000, 2000]),
            step(200, &[1000, 2000]),
            step(0, &[-1, -1]),
        ])
    }

    fn servo_hal(channels: usize) -> (HalRegistry, CommandLog) {
        let (mut hal, log) = SimBackend::new().with_servos(channels).into_registry();
        hal.initialize_all();
        (hal, log)
    }

    fn engine(plan: SequencePlan) -> (SequenceEngine<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let mut engine = SequenceEngine::with_clock(clock.clone());
        engine.load_plan(plan);
        (engine, clock)
    }

    fn positions(hal: &HalRegistry) -> Vec<i32> {
        let servos = hal.servos().unwrap();
        (1..=servos.channel_count())
            .map(|ch| servos.position(ch).unwrap())
            .collect()
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> Result<(), SithError> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn three_step_scenario() {
        let (mut hal, _) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());
        assert!(engine.start());

        engine.update(&mut hal);
        assert_eq!(engine.current_step(), 0);

        clock.advance(100);
        engine.update(&mut hal);
        assert_eq!(positions(&hal), vec![2000, 2000]);
        assert_eq!(engine.current_step(), 1);

        clock.advance(199);
        engine.update(&mut hal);
        assert_eq!(engine.current_step(), 1);

        clock.advance(1);
        engine.update(&mut hal);
        assert_eq!(positions(&hal), vec![1000, 2000]);
        assert_eq!(engine.current_step(), 2);
        assert_eq!(engine.state(), PlaybackState::Running);

        engine.update(&mut hal);
        assert_eq!(positions(&hal), vec![pulse::NO_PULSE, pulse::NO_PULSE]);
        assert_eq!(engine.state(), PlaybackState::Completed);
    }

    #[test]
    fn start_requires_plan_and_not_running() {
        let mut engine = SequenceEngine::with_clock(ManualClock::new());
        assert!(!engine.start());

        engine.load_plan(plan(vec![]));
        assert!(!engine.start());

        engine.load_plan(scenario_plan());
        assert!(engine.start());
        assert!(!engine.start());
    }

    #[test]
    fn update_is_noop_unless_running() {
        let (mut hal, log) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());
        clock.advance(1_000);
        engine.update(&mut hal);
        assert!(log.is_empty());
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn stop_then_start_replays_identically() {
        let (mut hal, log) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());

        let run = |engine: &mut SequenceEngine<ManualClock>, hal: &mut HalRegistry| {
            assert!(engine.start());
            for _ in 0..10 {
                clock.advance(50);
                engine.update(hal);
            }
            assert_eq!(engine.state(), PlaybackState::Completed);
        };

        run(&mut engine, &mut hal);
        let first: Vec<(String, String)> =
            log.records().into_iter().map(|r| (r.command, r.detail)).collect();

        engine.stop();
        assert_eq!(engine.current_step(), 0);
        log.clear();
        run(&mut engine, &mut hal);
        let second: Vec<(String, String)> =
            log.records().into_iter().map(|r| (r.command, r.detail)).collect();

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn stop_mid_run_rewinds() {
        let (mut hal, _) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());
        engine.start();
        clock.advance(100);
        engine.update(&mut hal);
        assert_eq!(engine.current_step(), 1);

        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.current_step(), 0);
        assert_eq!(engine.plan().map(SequencePlan::len), Some(3));
    }

    #[test]
    fn resume_keeps_time_already_waited() {
        let (mut hal, _) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());
        engine.start();

        clock.advance(60);
        engine.pause();
        clock.advance(1_000);
        engine.update(&mut hal);
        assert_eq!(engine.current_step(), 0);

        engine.resume();
        clock.advance(39);
        engine.update(&mut hal);
        assert_eq!(engine.current_step(), 0);
        clock.advance(1);
        engine.update(&mut hal);
        assert_eq!(engine.current_step(), 1);
    }

    #[test]
    fn second_pause_is_ignored() {
        let (mut hal, _) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());
        engine.start();

        clock.advance(60);
        engine.pause();
        clock.advance(500);
        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Paused);

        engine.resume();
        clock.advance(39);
        engine.update(&mut hal);
        assert_eq!(engine.current_step(), 0);
        clock.advance(1);
        engine.update(&mut hal);
        assert_eq!(engine.current_step(), 1);
    }

    #[test]
    fn resume_while_stopped_is_ignored() {
        let (mut engine, _) = engine(scenario_plan());
        engine.resume();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn callbacks_fire_once_per_playback() {
        let (mut hal, _) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());
        let (count, callback) = counter();
        engine.add_completion_callback(callback);

        engine.start();
        for _ in 0..50 {
            clock.advance(100);
            engine.update(&mut hal);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);

        engine.start();
        for _ in 0..50 {
            clock.advance(100);
            engine.update(&mut hal);
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_callbacks_do_not_stop_others() {
        let (mut hal, _) = servo_hal(2);
        let (mut engine, clock) = engine(plan(vec![step(0, &[1000])]));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        engine.add_completion_callback(move || {
            o.lock().unwrap().push("err");
            Err(SithError::HardwareFault {
                component: "test".to_string(),
                details: "boom".to_string(),
            })
        });
        let o = Arc::clone(&order);
        engine.add_completion_callback(move || {
            o.lock().unwrap().push("panic");
            panic!("callback exploded");
        });
        let o = Arc::clone(&order);
        engine.add_completion_callback(move || {
            o.lock().unwrap().push("ok");
            Ok(())
        });

        engine.start();
        clock.advance(1);
        engine.update(&mut hal);

        assert_eq!(engine.state(), PlaybackState::Completed);
        assert_eq!(*order.lock().unwrap(), vec!["err", "panic", "ok"]);
    }

    #[test]
    fn removed_callback_does_not_fire() {
        let (mut hal, _) = servo_hal(1);
        let (mut engine, _clock) = engine(plan(vec![step(0, &[1000])]));
        let (kept, kept_cb) = counter();
        let (removed, removed_cb) = counter();
        engine.add_completion_callback(kept_cb);
        let id = engine.add_completion_callback(removed_cb);

        assert!(engine.remove_completion_callback(id));
        assert!(!engine.remove_completion_callback(id));

        engine.start();
        engine.update(&mut hal);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_servo_bank_still_advances() {
        let mut hal = HalRegistry::new();
        let (mut engine, clock) = engine(scenario_plan());
        let (count, callback) = counter();
        engine.add_completion_callback(callback);
        engine.start();

        for _ in 0..4 {
            clock.advance(200);
            engine.update(&mut hal);
        }
        assert_eq!(engine.state(), PlaybackState::Completed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn range_speed_and_bank_size_limit_channels() {
        let (mut hal, log) = servo_hal(3);
        let mut windowed = step(0, &[1000, 1000, 1000, 1000, 1000]);
        windowed.speed = Some(15);
        windowed.start_servo = Some(2);
        let (mut engine, _clock) = engine(plan(vec![windowed]));

        engine.start();
        engine.update(&mut hal);

        let speeds: Vec<String> = log.filter("set_speed").into_iter().map(|r| r.detail).collect();
        assert_eq!(speeds, vec!["channel=2 speed=15", "channel=3 speed=15"]);
        assert_eq!(positions(&hal), vec![0, 1000, 1000]);
    }

    #[test]
    fn zero_speed_is_not_applied() {
        let (mut hal, log) = servo_hal(1);
        let mut unlimited = step(0, &[2000]);
        unlimited.speed = Some(0);
        let (mut engine, _clock) = engine(plan(vec![unlimited]));
        engine.start();
        engine.update(&mut hal);
        assert!(log.filter("set_speed").is_empty());
        assert_eq!(log.filter("set_position").len(), 1);
    }

    #[test]
    fn failed_load_keeps_previous_plan() {
        let (mut engine, _) = engine(scenario_plan());
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.json");
        std::fs::write(&bad, r#"{"name":"broken","steps":[{"time_ms":"soon"}]}"#).unwrap();

        assert!(matches!(
            engine.load_file(&bad),
            Err(SithError::SequenceLoad(_))
        ));
        assert_eq!(engine.plan().map(SequencePlan::name), Some("test"));
        assert!(engine.start());
    }

    #[test]
    fn load_file_replaces_plan_and_resets() {
        let (mut hal, _) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());
        engine.start();
        clock.advance(100);
        engine.update(&mut hal);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.toml");
        std::fs::write(
            &path,
            "name = \"one\"\n[[steps]]\ntime_ms = 10\nservo_positions = [1750]\n",
        )
        .unwrap();
        engine.load_file(&path).unwrap();

        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.current_step(), 0);
        assert_eq!(engine.status().total_steps, 1);
    }

    #[test]
    fn status_reports_progress() {
        let (mut hal, _) = servo_hal(2);
        let (mut engine, clock) = engine(scenario_plan());
        assert_eq!(engine.status().progress, 0.0);

        engine.start();
        clock.advance(100);
        engine.update(&mut hal);
        let status = engine.status();
        assert_eq!(status.state, PlaybackState::Running);
        assert_eq!(status.current_step, 1);
        assert_eq!(status.total_steps, 3);
        assert!((status.progress - 1.0 / 3.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "running");
    }
}
