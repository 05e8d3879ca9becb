//! Maps `Box<dyn Error>` from trait boundaries to typed `AcqError`.
//!
//! The detector capability in `spectrod_traits` uses
//! `Box<dyn Error + Send + Sync>` for maximum flexibility; this module
//! converts those to our typed error enum, with an optional feature-gated
//! path for `spectrod_hardware::HwError` downcasting.

use crate::error::AcqError;

/// Map a trait-boundary error to a typed `AcqError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> AcqError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<spectrod_hardware::HwError>() {
            return match hw {
                spectrod_hardware::HwError::Acquiring => AcqError::Busy,
                spectrod_hardware::HwError::InvalidParameter(p) => {
                    AcqError::Validation(p.clone())
                }
                other => AcqError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("already in progress") {
        AcqError::Busy
    } else {
        AcqError::Hardware(s)
    }
}
