//! [`HalRegistry`] – name-indexed capability store and lifecycle coordinator.
//!
//! The registry owns every [`Capability`] of one control session.  Callers
//! resolve capabilities by [`CapabilityName`] and never see the concrete
//! backend type.  The map is mutated only during setup ([`register`],
//! [`attach_backend`]) and teardown ([`shutdown_all`]); during operation the
//! parser and sequence engine only look capabilities up.
//!
//! [`register`]: HalRegistry::register
//! [`attach_backend`]: HalRegistry::attach_backend
//! [`shutdown_all`]: HalRegistry::shutdown_all

use std::collections::BTreeMap;

use sith_types::{CapabilityName, SithError};
use tracing::{Span, error, info, warn};

use crate::capability::{Capability, Leds, Motors, Servos, Sound};

/// A source of capabilities, e.g. the simulation backend or a real driver
/// stack.  This is the only coupling point between the core and backends.
pub trait Backend {
    /// Short backend label used in log output.
    fn name(&self) -> &str;

    /// Hand over every capability this backend exposes.  Ownership moves to
    /// the caller, so a capability can never end up in two registries.
    fn take_capabilities(&mut self) -> Vec<Capability>;
}

/// Lifecycle bookkeeping for one registered capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Registered, `initialize` not called yet.
    Registered,
    /// `initialize` succeeded.
    Ready,
    /// `initialize` failed; the entry stays registered for a later retry.
    Failed,
    /// `shutdown` has been called.
    ShutDown,
}

struct Entry {
    capability: Capability,
    state: EntryState,
}

/// Central capability registry.
///
/// # Example
///
/// ```
/// use sith_hal::registry::HalRegistry;
/// use sith_hal::sim::SimBackend;
/// use sith_types::CapabilityName;
///
/// let mut backend = SimBackend::new().with_servos(16);
/// let mut hal = HalRegistry::new();
/// hal.attach_backend(&mut backend);
/// assert!(hal.initialize_all());
/// assert!(hal.lookup(CapabilityName::Servos).is_some());
/// ```
pub struct HalRegistry {
    entries: BTreeMap<CapabilityName, Entry>,
    span: Span,
}

impl Default for HalRegistry {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            span: tracing::info_span!("hal"),
        }
    }
}

impl HalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log inside `span` instead of the default `hal` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Store `capability` under its declared name.  A previous capability
    /// with the same name is replaced and returned.  If the old one had been
    /// initialised (or had failed to) it is shut down first, best-effort, so
    /// the caller only has to drop it.  The new capability is not initialised.
    pub fn register(&mut self, capability: Capability) -> Option<Capability> {
        let _enter = self.span.enter();
        let name = capability.name();
        let previous = self.entries.insert(
            name,
            Entry {
                capability,
                state: EntryState::Registered,
            },
        );
        let Some(mut old) = previous else {
            info!(capability = %name, "registered capability");
            return None;
        };
        warn!(capability = %name, "replaced previously registered capability");
        if matches!(old.state, EntryState::Ready | EntryState::Failed) {
            match old.capability.shutdown() {
                Ok(()) => info!(capability = %name, "replaced capability shut down"),
                Err(e) => {
                    warn!(capability = %name, error = %e, "replaced capability shutdown failed")
                }
            }
        }
        Some(old.capability)
    }

    /// Register every capability `backend` exposes.  Returns how many were
    /// registered.
    pub fn attach_backend(&mut self, backend: &mut dyn Backend) -> usize {
        let capabilities = backend.take_capabilities();
        let count = capabilities.len();
        {
            let _enter = self.span.enter();
            info!(backend = backend.name(), count, "attaching backend");
        }
        for capability in capabilities {
            // Replaced capabilities are already shut down by `register`.
            drop(self.register(capability));
        }
        count
    }

    /// Resolve a capability by name.  Missing names yield `None`.
    pub fn lookup(&self, name: CapabilityName) -> Option<&Capability> {
        self.entries.get(&name).map(|e| &e.capability)
    }

    /// Mutable access to a capability by name, regardless of availability.
    pub fn lookup_mut(&mut self, name: CapabilityName) -> Option<&mut Capability> {
        self.entries.get_mut(&name).map(|e| &mut e.capability)
    }

    /// Lifecycle state of a registered capability.
    pub fn state(&self, name: CapabilityName) -> Option<EntryState> {
        self.entries.get(&name).map(|e| e.state)
    }

    pub fn is_initialized(&self, name: CapabilityName) -> bool {
        self.state(name) == Some(EntryState::Ready)
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> Vec<CapabilityName> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Initialise every registered capability.
    ///
    /// Returns `true` only when all of them succeed.  A failure is logged and
    /// marks that entry [`EntryState::Failed`]; the remaining capabilities are
    /// still initialised.
    pub fn initialize_all(&mut self) -> bool {
        let _enter = self.span.enter();
        let mut all_ready = true;
        for (name, entry) in &mut self.entries {
            match entry.capability.initialize() {
                Ok(()) => {
                    entry.state = EntryState::Ready;
                    info!(capability = %name, "capability initialised");
                }
                Err(e) => {
                    entry.state = EntryState::Failed;
                    all_ready = false;
                    error!(capability = %name, error = %e, "failed to initialise capability");
                }
            }
        }
        all_ready
    }

    /// Shut down every capability that has not been shut down yet.  Errors
    /// are logged and never stop the remaining shutdowns.
    pub fn shutdown_all(&mut self) {
        let _enter = self.span.enter();
        for (name, entry) in &mut self.entries {
            if entry.state == EntryState::ShutDown {
                continue;
            }
            if let Err(e) = entry.capability.shutdown() {
                warn!(capability = %name, error = %e, "capability shutdown failed");
            } else {
                info!(capability = %name, "capability shut down");
            }
            entry.state = EntryState::ShutDown;
        }
    }

    // Internal helper: resolve a capability that is present and reports ready.
    fn available_mut(&mut self, name: CapabilityName) -> Result<&mut Capability, SithError> {
        match self.entries.get_mut(&name) {
            Some(entry) if entry.capability.is_available() => Ok(&mut entry.capability),
            _ => Err(SithError::CapabilityUnavailable(name)),
        }
    }

    /// The servo bank, if registered and available.
    ///
    /// # Errors
    ///
    /// [`SithError::CapabilityUnavailable`] when missing or not ready.
    pub fn servos_mut(&mut self) -> Result<&mut dyn Servos, SithError> {
        self.available_mut(CapabilityName::Servos)?
            .as_servos_mut()
            .ok_or(SithError::CapabilityUnavailable(CapabilityName::Servos))
    }

    /// Read-only view of the servo bank, regardless of availability.
    pub fn servos(&self) -> Option<&dyn Servos> {
        self.lookup(CapabilityName::Servos)?.as_servos()
    }

    pub fn motors_mut(&mut self) -> Result<&mut dyn Motors, SithError> {
        self.available_mut(CapabilityName::Motors)?
            .as_motors_mut()
            .ok_or(SithError::CapabilityUnavailable(CapabilityName::Motors))
    }

    pub fn leds_mut(&mut self) -> Result<&mut dyn Leds, SithError> {
        self.available_mut(CapabilityName::Leds)?
            .as_leds_mut()
            .ok_or(SithError::CapabilityUnavailable(CapabilityName::Leds))
    }

    pub fn sound_mut(&mut self) -> Result<&mut dyn Sound, SithError> {
        self.available_mut(CapabilityName::Sound)?
            .as_sound_mut()
            .ok_or(SithError::CapabilityUnavailable(CapabilityName::Sound))
    }
}
