//! Invariant checking for dispatcher runs.
//!
//! Invariants are properties that must hold after every event, whatever
//! order the events arrive in. Tests capture a [`SystemSnapshot`] after each
//! event and run the registered [`Invariant`]s against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! snapshot.record(dispatcher.registry(), &controller);
//! registry.assert_all(&snapshot, "after create");
//! ```

mod checks;
mod snapshot;

pub use checks::{
    NamesNeverRegress, ResolvedRoomsHaveBuffers, WritersReleased, WritesTargetNamedBuffers,
};
pub use snapshot::SystemSnapshot;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a [`SystemSnapshot`].
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with the standard dispatcher invariants.
    ///
    /// Includes:
    /// - [`NamesNeverRegress`]: concrete names never revert to unresolved
    /// - [`ResolvedRoomsHaveBuffers`]: resolved rooms have a buffer
    /// - [`WritesTargetNamedBuffers`]: no write lands in an unnamed buffer
    /// - [`WritersReleased`]: no writer outlives its write
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(NamesNeverRegress);
        registry.add(ResolvedRoomsHaveBuffers);
        registry.add(WritesTargetNamedBuffers);
        registry.add(WritersReleased);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, returning every violation found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
