//! Probe algorithms. Each one reads the reflector cache, talks to the
//! reflector client, records exactly one sample (or nothing when a
//! reflector is missing) and reports the outcome. None of them retry;
//! the scheduler cadence is the retry mechanism.

pub mod bufferbloat;
pub mod chg;
pub mod micro;
pub mod multi;
pub mod parallel;

use std::sync::Arc;

use crate::error::ProbeError;
use crate::store::ReflectorSet;

/// Current near URL, or an error when the cache has none.
fn near_url(set: &Arc<ReflectorSet>) -> Result<&str, ProbeError> {
    if set.near_url.is_empty() {
        Err(ProbeError::MissingReflector("near"))
    } else {
        Ok(&set.near_url)
    }
}
