//! Quota enforcement across the three dimensions carried on an API key
//! (§3 `ApiKeyQuotas`, §4.2.7): per-second throttle, daily, monthly.
//!
//! Each dimension is a compare-and-increment call against the
//! [`Datastore`] collaborator (§5); calendar boundaries are computed in the
//! gateway instance's local timezone the same way the teacher computes
//! cache-bucket keys in `_teacher_ref/cache/mod.rs`.

use chrono::{Datelike, Local};

use crate::config::apikey::ApiKey;
use crate::datastore::Datastore;
use crate::error::PipelineError;

fn day_key(now: &chrono::DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn month_key(now: &chrono::DateTime<Local>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

/// Check and consume one unit of quota across all three dimensions.
/// Dimensions are checked in throttle, day, month order; the first
/// exhausted dimension is reported (callers don't need to know whether a
/// later dimension also failed).
pub async fn check(
    datastore: &dyn Datastore,
    key: &ApiKey,
    now: chrono::DateTime<Local>,
) -> Result<(), PipelineError> {
    let throttle_key = format!("throttle:{}", key.client_id);
    let day_key_str = format!("day:{}", key.client_id);
    let month_key_str = format!("month:{}", key.client_id);

    let throttle_count = datastore
        .incr_rolling(&throttle_key, std::time::Duration::from_secs(1))
        .await
        .map_err(|_| PipelineError::Internal)?;
    if throttle_count > key.quotas.throttling_quota {
        return Err(PipelineError::QuotaExceeded { dimension: "throttle" });
    }

    let day_count = datastore
        .incr_calendar(&day_key_str, &day_key(&now))
        .await
        .map_err(|_| PipelineError::Internal)?;
    if day_count > key.quotas.daily_quota {
        return Err(PipelineError::QuotaExceeded { dimension: "day" });
    }

    let month_count = datastore
        .incr_calendar(&month_key_str, &month_key(&now))
        .await
        .map_err(|_| PipelineError::Internal)?;
    if month_count > key.quotas.monthly_quota {
        return Err(PipelineError::QuotaExceeded { dimension: "month" });
    }

    Ok(())
}
