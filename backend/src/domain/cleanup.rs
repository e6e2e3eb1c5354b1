//! Daily cleanup of stale occurrences.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::domain::ports::{SchedulePersistenceError, ScheduleRepository};

/// Occurrences older than this are deleted; their tasks survive.
const RETENTION_DAYS: i64 = 14;

/// The cleanup service (cron-triggered once per day).
pub struct OccurrenceCleanup {
    schedules: Arc<dyn ScheduleRepository>,
}

impl OccurrenceCleanup {
    pub fn new(schedules: Arc<dyn ScheduleRepository>) -> Self {
        Self { schedules }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), SchedulePersistenceError> {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let deleted = self.schedules.delete_occurrences_before(cutoff).await?;
        info!(deleted, %cutoff, "old occurrences removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockScheduleRepository;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn deletes_exactly_fourteen_days_back() {
        let now = Utc
            .with_ymd_and_hms(2025, 1, 15, 3, 0, 0)
            .single()
            .expect("valid instant");
        let expected_cutoff = Utc
            .with_ymd_and_hms(2025, 1, 1, 3, 0, 0)
            .single()
            .expect("valid instant");

        let mut schedules = MockScheduleRepository::new();
        schedules
            .expect_delete_occurrences_before()
            .times(1)
            .withf(move |cutoff| *cutoff == expected_cutoff)
            .returning(|_| Ok(7));

        let cleanup = OccurrenceCleanup::new(Arc::new(schedules));
        cleanup.tick(now).await.expect("tick succeeds");
    }
}
