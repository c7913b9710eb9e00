//! Tiered retention for backup versions.
//!
//! Backups younger than `keep_all_for_hours` are always kept. Older ones
//! fall into the finest enabled tier whose window covers them (daily,
//! weekly, monthly), where only the newest backup per period survives.
//! Daily periods are UTC calendar dates. Weekly and monthly periods are
//! whole units of age at rotation time (7 and 30 days). The current
//! (youngest) period of each tier is not thinned. Whatever survives is
//! then capped at `max_total_backups`, newest first.
//!
//! Selection here is pure; the store performs the deletions.

use crate::store::manifest::BackupManifest;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

const DAYS_PER_MONTH: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    /// Keep every backup younger than this many hours (0 disables)
    pub keep_all_for_hours: u32,

    /// Keep one backup per day for this many days (0 disables)
    pub keep_daily_for_days: u32,

    /// Keep one backup per week for this many weeks (0 disables)
    pub keep_weekly_for_weeks: u32,

    /// Keep one backup per 30-day month for this many months (0 disables)
    pub keep_monthly_for_months: u32,

    /// Hard cap on retained backups; values below 1 are treated as 1
    pub max_total_backups: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            keep_all_for_hours: 24,
            keep_daily_for_days: 7,
            keep_weekly_for_weeks: 4,
            keep_monthly_for_months: 6,
            max_total_backups: 100,
        }
    }
}

enum Period {
    CalendarDay,
    Age(Duration),
}

struct Tier {
    period: Period,
    window: Duration,
}

impl Tier {
    /// Periods back from `now`; 0 is the period still open.
    fn bucket(&self, now: DateTime<Utc>, timestamp: DateTime<Utc>, age: Duration) -> i64 {
        match self.period {
            Period::CalendarDay => now
                .date_naive()
                .signed_duration_since(timestamp.date_naive())
                .num_days()
                .max(0),
            Period::Age(length) => age.num_seconds() / length.num_seconds(),
        }
    }
}

/// Huge configured windows saturate instead of overflowing.
fn window(span: Option<Duration>) -> Duration {
    span.unwrap_or(Duration::MAX)
}

impl RotationPolicy {
    /// A policy that only enforces a cap.
    pub fn cap_only(max_total_backups: u32) -> Self {
        Self {
            keep_all_for_hours: 0,
            keep_daily_for_days: 0,
            keep_weekly_for_weeks: 0,
            keep_monthly_for_months: 0,
            max_total_backups,
        }
    }

    fn tiers(&self) -> Vec<Tier> {
        let mut tiers = Vec::with_capacity(3);
        if self.keep_daily_for_days > 0 {
            tiers.push(Tier {
                period: Period::CalendarDay,
                window: window(Duration::try_days(i64::from(self.keep_daily_for_days))),
            });
        }
        if self.keep_weekly_for_weeks > 0 {
            tiers.push(Tier {
                period: Period::Age(Duration::weeks(1)),
                window: window(Duration::try_weeks(i64::from(self.keep_weekly_for_weeks))),
            });
        }
        if self.keep_monthly_for_months > 0 {
            tiers.push(Tier {
                period: Period::Age(Duration::days(DAYS_PER_MONTH)),
                window: window(Duration::try_days(
                    DAYS_PER_MONTH * i64::from(self.keep_monthly_for_months),
                )),
            });
        }
        tiers
    }

    fn effective_cap(&self) -> usize {
        self.max_total_backups.max(1) as usize
    }

    /// Versions that survive rotation at `now`.
    ///
    /// The newest version always survives.
    pub fn select_retained(
        &self,
        now: DateTime<Utc>,
        backups: &[(u32, DateTime<Utc>)],
    ) -> BTreeSet<u32> {
        let mut ordered = backups.to_vec();
        ordered.sort_by(|a, b| b.0.cmp(&a.0));

        let Some(&(newest, _)) = ordered.first() else {
            return BTreeSet::new();
        };

        let keep_all = window(Duration::try_hours(i64::from(self.keep_all_for_hours)));
        let tiers = self.tiers();

        // Newest first
        let mut kept: Vec<u32> = Vec::with_capacity(ordered.len());

        if self.keep_all_for_hours == 0 && tiers.is_empty() {
            kept.extend(ordered.iter().map(|(v, _)| *v));
        } else {
            let mut seen: Vec<HashSet<i64>> = tiers.iter().map(|_| HashSet::new()).collect();

            for (version, timestamp) in &ordered {
                let age = (now - *timestamp).max(Duration::zero());

                let keep = if age < keep_all {
                    true
                } else {
                    match tiers.iter().position(|t| age < t.window) {
                        Some(i) => {
                            let bucket = tiers[i].bucket(now, *timestamp, age);
                            bucket == 0 || !seen[i].contains(&bucket)
                        }
                        None => false,
                    }
                };

                if keep {
                    for (tier, seen) in tiers.iter().zip(seen.iter_mut()) {
                        seen.insert(tier.bucket(now, *timestamp, age));
                    }
                    kept.push(*version);
                }
            }

            if kept.first() != Some(&newest) {
                kept.insert(0, newest);
            }
        }

        kept.truncate(self.effective_cap());
        kept.into_iter().collect()
    }

    /// Versions in `manifest` that rotation at `now` would delete, ascending.
    pub fn versions_to_remove(&self, now: DateTime<Utc>, manifest: &BackupManifest) -> Vec<u32> {
        let pairs: Vec<(u32, DateTime<Utc>)> = manifest
            .backups
            .iter()
            .map(|r| (r.version, r.timestamp))
            .collect();
        let retained = self.select_retained(now, &pairs);

        let mut removed: Vec<u32> = pairs
            .iter()
            .map(|(v, _)| *v)
            .filter(|v| !retained.contains(v))
            .collect();
        removed.sort_unstable();
        removed
    }
}
