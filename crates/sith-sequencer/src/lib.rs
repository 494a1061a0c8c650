//! # sith-sequencer
//!
//! Timed panel choreography.
//!
//! - [`plan`] – loads and validates [`SequencePlan`]s from JSON, TOML or
//!   MarcDuino sequence rows.
//! - [`engine`] – the polled [`SequenceEngine`] state machine that applies
//!   plan steps to the servo bank of a [`HalRegistry`](sith_hal::HalRegistry).
//! - [`clock`] – the [`Clock`] abstraction the engine measures waits with.

pub mod clock;
pub mod engine;
pub mod plan;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{CallbackId, CompletionCallback, PlaybackState, PlaybackStatus, SequenceEngine};
pub use plan::{ChannelRange, PlanDocument, SequencePlan, SequenceStep, StepDocument};
