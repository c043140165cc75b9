use crate::types::{
    ChangeSet, RecommendationStats, SyncMetadata, SyncMode, SyncReason, SyncRecommendation,
    SyncStrategy,
};
use crate::{Result, SyncError};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Reject strategies that cannot run. Checked before anything touches the file system.
pub fn validate(
    strategy: &SyncStrategy,
    include_patterns: &[String],
    max_concurrency: usize,
) -> Result<()> {
    if !strategy.time_threshold_hours.is_finite() || strategy.time_threshold_hours < 0.0 {
        return Err(SyncError::Policy(format!(
            "time_threshold_hours must be a non-negative number, got {}",
            strategy.time_threshold_hours
        )));
    }
    if strategy.mode == SyncMode::Selective
        && include_patterns.iter().all(|p| p.trim().is_empty())
    {
        return Err(SyncError::Policy(
            "selective mode requires at least one include pattern".to_string(),
        ));
    }
    if max_concurrency == 0 {
        return Err(SyncError::Policy(
            "max_concurrency must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Decide whether and why to sync. Pure: same inputs, same answer.
pub fn recommend(
    change_set: ChangeSet,
    strategy: &SyncStrategy,
    metadata: Option<&SyncMetadata>,
    now_ms: u64,
) -> SyncRecommendation {
    let hours_since_last_sync =
        metadata.map(|m| now_ms.saturating_sub(m.last_sync_time) as f64 / MS_PER_HOUR);
    let stats = RecommendationStats {
        new: change_set.new.len(),
        modified: change_set.modified.len(),
        unchanged: change_set.unchanged.len(),
        deleted: change_set.deleted.len(),
        hours_since_last_sync,
    };

    let threshold_passed = hours_since_last_sync
        .map(|hours| hours > strategy.time_threshold_hours)
        .unwrap_or(true);

    let reason = if strategy.force_sync {
        SyncReason::Forced
    } else if strategy.session_start && change_set.has_changes() {
        SyncReason::SessionStart
    } else if !change_set.new.is_empty() {
        SyncReason::New
    } else if !change_set.modified.is_empty() {
        SyncReason::Modified
    } else if !change_set.deleted.is_empty() {
        SyncReason::Deleted
    } else if threshold_passed {
        SyncReason::TimeThreshold
    } else {
        SyncReason::Unchanged
    };

    SyncRecommendation {
        should_sync: reason != SyncReason::Unchanged,
        reason,
        change_set,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HOUR: u64 = 3_600_000;

    fn metadata(last_sync_time: u64) -> SyncMetadata {
        SyncMetadata {
            last_sync_time,
            strategy_used: SyncMode::Incremental,
            files_processed: 1,
        }
    }

    fn changes(new: &[&str], modified: &[&str], deleted: &[&str]) -> ChangeSet {
        let to_set = |paths: &[&str]| paths.iter().map(|p| p.to_string()).collect();
        ChangeSet {
            new: to_set(new),
            modified: to_set(modified),
            deleted: to_set(deleted),
            ..Default::default()
        }
    }

    #[test]
    fn priority_order_first_match_wins() {
        let now = 100 * HOUR;
        let recent = metadata(now - HOUR);
        let strategy = SyncStrategy::default();

        let forced = SyncStrategy {
            force_sync: true,
            session_start: true,
            ..SyncStrategy::default()
        };
        let rec = recommend(changes(&["a"], &[], &[]), &forced, Some(&recent), now);
        assert_eq!(rec.reason, SyncReason::Forced);

        let session = SyncStrategy {
            session_start: true,
            ..SyncStrategy::default()
        };
        let rec = recommend(changes(&[], &[], &["d"]), &session, Some(&recent), now);
        assert_eq!(rec.reason, SyncReason::SessionStart);
        let rec = recommend(changes(&[], &[], &[]), &session, Some(&recent), now);
        assert_eq!(rec.reason, SyncReason::Unchanged);

        let rec = recommend(changes(&["a"], &["m"], &["d"]), &strategy, Some(&recent), now);
        assert_eq!(rec.reason, SyncReason::New);
        let rec = recommend(changes(&[], &["m"], &["d"]), &strategy, Some(&recent), now);
        assert_eq!(rec.reason, SyncReason::Modified);
        let rec = recommend(changes(&[], &[], &["d"]), &strategy, Some(&recent), now);
        assert_eq!(rec.reason, SyncReason::Deleted);
        assert_eq!(rec.stats.deleted, 1);
    }

    #[test]
    fn time_threshold_and_unchanged() {
        let now = 100 * HOUR;
        let strategy = SyncStrategy {
            time_threshold_hours: 24.0,
            ..SyncStrategy::default()
        };

        let never = recommend(ChangeSet::default(), &strategy, None, now);
        assert!(never.should_sync);
        assert_eq!(never.reason, SyncReason::TimeThreshold);
        assert_eq!(never.stats.hours_since_last_sync, None);

        let stale = recommend(ChangeSet::default(), &strategy, Some(&metadata(now - 25 * HOUR)), now);
        assert_eq!(stale.reason, SyncReason::TimeThreshold);

        let fresh = recommend(ChangeSet::default(), &strategy, Some(&metadata(now - HOUR)), now);
        assert!(!fresh.should_sync);
        assert_eq!(fresh.reason, SyncReason::Unchanged);
        assert_eq!(fresh.stats.hours_since_last_sync, Some(1.0));
    }

    #[test]
    fn validation_rejects_unrunnable_strategies() {
        let ok = SyncStrategy::default();
        assert!(validate(&ok, &[], 5).is_ok());

        let negative = SyncStrategy {
            time_threshold_hours: -1.0,
            ..SyncStrategy::default()
        };
        assert!(matches!(validate(&negative, &[], 5), Err(SyncError::Policy(_))));
        let nan = SyncStrategy {
            time_threshold_hours: f64::NAN,
            ..SyncStrategy::default()
        };
        assert!(validate(&nan, &[], 5).is_err());

        let selective = SyncStrategy {
            mode: SyncMode::Selective,
            ..SyncStrategy::default()
        };
        assert!(validate(&selective, &[" ".to_string()], 5).is_err());
        assert!(validate(&selective, &["src/**".to_string()], 5).is_ok());

        assert!(validate(&ok, &[], 0).is_err());
    }
}
