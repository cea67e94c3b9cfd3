//! Restriction-list evaluation mapped to pipeline errors (§4.2.2).

use crate::config::restrictions::{Restrictions, RestrictionVerdict};
use crate::error::PipelineError;

/// `Ok(true)` means the request was explicitly allowed (short-circuits
/// further restriction evaluation, per §4.2.2); `Ok(false)` means no entry
/// decided the outcome and the gate should continue to the next stage.
pub fn check(restrictions: &Restrictions, method: &str, path: &str) -> Result<bool, PipelineError> {
    match restrictions.evaluate(method, path) {
        RestrictionVerdict::Continue => Ok(false),
        RestrictionVerdict::Allowed => Ok(true),
        RestrictionVerdict::Forbidden => Err(PipelineError::RestrictionForbidden),
        RestrictionVerdict::NotFound => Err(PipelineError::RestrictionNotFound),
    }
}
