//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable implementation module provides a `Registry` struct that
/// implements this trait, declaring the name it is selected by in the
/// configuration file and the factory that builds it.
pub trait ImplementationRegistry {
	/// Name used in configuration, e.g. "memory" for
	/// `storage.implementations.memory`.
	const NAME: &'static str;

	/// Factory function type for this kind of implementation.
	type Factory;

	/// Returns the factory that builds this implementation from its
	/// configuration table.
	fn factory() -> Self::Factory;
}
