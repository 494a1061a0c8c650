//! `sith-hal` – Hardware Abstraction Registry
//!
//! Lets the protocol parser and the sequence engine drive interchangeable
//! hardware without knowing its concrete type.
//!
//! # Modules
//!
//! - [`capability`] – the [`Lifecycle`] contract shared by every hardware
//!   domain, the per-domain traits ([`Motors`], [`Servos`], [`Leds`],
//!   [`Sound`]) and the closed [`Capability`] enum backends hand over.
//! - [`registry`] – [`HalRegistry`]: name-indexed ownership of capabilities,
//!   fail-soft `initialize_all`, best-effort `shutdown_all`, and the
//!   [`Backend`] trait through which capability sets are attached.
//! - [`sim`] – [`SimBackend`]: logging stand-ins for every domain that record
//!   each hardware call in a shared [`CommandLog`].

pub mod capability;
pub mod registry;
pub mod sim;

pub use capability::{Capability, Leds, Lifecycle, Motors, Rgb, Servos, Sound};
pub use registry::{Backend, EntryState, HalRegistry};
pub use sim::{CommandLog, CommandRecord, SimBackend};
