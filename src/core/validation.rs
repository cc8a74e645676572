//! Validation hook for reloaded configuration values.

use crate::error::ValidationError;

/// Checks a freshly parsed configuration before it is swapped in.
///
/// A [`ConfigSlot`](crate::reload::ConfigSlot) built with
/// [`validated`](crate::reload::ConfigSlot::validated) runs this on every
/// apply; a failure keeps the previous value.
///
/// # Examples
///
/// ```rust
/// use hotswap_watch::core::Validate;
/// use hotswap_watch::error::ValidationError;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, Clone)]
/// struct PoolConfig {
///     min_idle: u32,
///     max_size: u32,
/// }
///
/// impl Validate for PoolConfig {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.max_size == 0 {
///             return Err(ValidationError::invalid_field("max_size", "must be positive"));
///         }
///         if self.min_idle > self.max_size {
///             return Err(ValidationError::invalid_field(
///                 "min_idle",
///                 "cannot exceed max_size",
///             ));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` describing the first rule that failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
