use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};

use crate::core::cost::pricing::{self, PricingTable};
use crate::core::cost::scanner::{Buckets, TokenBucket};
use crate::core::models::cost::{CostReport, DailyUsage, ModelBreakdown, Totals};
use crate::core::models::snapshot::UsageSnapshot;

const WINDOW_DAYS: i64 = 7;

/// Price every bucket and roll them up into days (ascending) and grand totals.
/// Models within a day are ordered by name. No rounding is applied.
pub fn build_report(buckets: &Buckets, pricing_table: &PricingTable) -> CostReport {
    let mut by_date: BTreeMap<NaiveDate, Vec<(&str, &TokenBucket)>> = BTreeMap::new();
    for ((date, model), bucket) in buckets {
        by_date
            .entry(*date)
            .or_default()
            .push((model.as_str(), bucket));
    }

    let mut grand = TokenBucket::default();
    let mut grand_cost = 0.0;
    let mut daily: Vec<DailyUsage> = Vec::with_capacity(by_date.len());

    for (date, mut entries) in by_date {
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut day = TokenBucket::default();
        let mut day_cost = 0.0;
        let mut models_used = Vec::with_capacity(entries.len());
        let mut model_breakdowns = Vec::with_capacity(entries.len());

        for (model, bucket) in entries {
            let rates = pricing::resolve(model, pricing_table);
            let cost = bucket.cost(&rates);
            day.merge(bucket);
            day_cost += cost;
            models_used.push(model.to_string());
            model_breakdowns.push(ModelBreakdown {
                model_name: model.to_string(),
                input_tokens: bucket.input_tokens,
                output_tokens: bucket.output_tokens,
                cache_creation_tokens: bucket.cache_creation_tokens,
                cache_read_tokens: bucket.cache_read_tokens,
                cost,
            });
        }

        grand.merge(&day);
        grand_cost += day_cost;

        daily.push(DailyUsage {
            date,
            input_tokens: day.input_tokens,
            output_tokens: day.output_tokens,
            cache_creation_tokens: day.cache_creation_tokens,
            cache_read_tokens: day.cache_read_tokens,
            total_tokens: day.total_tokens(),
            total_cost: day_cost,
            models_used,
            model_breakdowns,
        });
    }

    CostReport {
        daily,
        totals: Totals {
            input_tokens: grand.input_tokens,
            output_tokens: grand.output_tokens,
            cache_creation_tokens: grand.cache_creation_tokens,
            cache_read_tokens: grand.cache_read_tokens,
            total_tokens: grand.total_tokens(),
            total_cost: grand_cost,
        },
    }
}

/// Build the snapshot for the week `week_offset` weeks from the current one,
/// as seen from the local "today".
pub fn derive_snapshot(report: &CostReport, week_offset: i32) -> UsageSnapshot {
    derive_snapshot_at(report, week_offset, Local::now().date_naive(), Some(Utc::now()))
}

/// End date of the window `week_offset` weeks from `today`, clamped to the
/// representable calendar so that a full window always fits.
fn window_end(today: NaiveDate, week_offset: i32) -> NaiveDate {
    let earliest_end = NaiveDate::MIN + Duration::days(WINDOW_DAYS - 1);
    let saturated = if week_offset < 0 {
        earliest_end
    } else {
        NaiveDate::MAX
    };
    Duration::try_days(i64::from(week_offset) * WINDOW_DAYS)
        .and_then(|shift| today.checked_add_signed(shift))
        .unwrap_or(saturated)
        .max(earliest_end)
}

/// Window derivation with an explicit "today" and refresh stamp.
///
/// `week_offset` 0 ends the window today; -1 ends it seven days ago.
pub fn derive_snapshot_at(
    report: &CostReport,
    week_offset: i32,
    today: NaiveDate,
    last_refresh: Option<DateTime<Utc>>,
) -> UsageSnapshot {
    let today_cost = report.day(today).map(|d| d.total_cost).unwrap_or(0.0);

    let week_end = window_end(today, week_offset);
    let week_start = week_end - Duration::days(WINDOW_DAYS - 1);

    let week: Vec<DailyUsage> = (0..WINDOW_DAYS)
        .map(|i| {
            let date = week_start + Duration::days(i);
            report
                .day(date)
                .cloned()
                .unwrap_or_else(|| DailyUsage::empty(date))
        })
        .collect();

    let month_total = report
        .daily
        .iter()
        .filter(|d| d.date.year() == week_end.year() && d.date.month() == week_end.month())
        .map(|d| d.total_cost)
        .sum();

    let earliest_date = report.earliest_date();
    let can_go_back = earliest_date.map(|e| e < week_start).unwrap_or(false);

    UsageSnapshot {
        today_cost,
        week,
        month_total,
        is_current_week: week_offset == 0,
        week_start,
        week_end,
        earliest_date,
        can_go_back,
        last_refresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn day_with_cost(d: NaiveDate, cost: f64) -> DailyUsage {
        let mut day = DailyUsage::empty(d);
        day.total_cost = cost;
        day.input_tokens = 10;
        day.total_tokens = 10;
        day
    }

    fn report_of(days: Vec<DailyUsage>) -> CostReport {
        let total_cost = days.iter().map(|d| d.total_cost).sum();
        CostReport {
            daily: days,
            totals: Totals {
                total_cost,
                ..Totals::default()
            },
        }
    }

    fn bucket(input: u64, output: u64, create: u64, read: u64) -> TokenBucket {
        TokenBucket {
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: create,
            cache_read_tokens: read,
        }
    }

    #[test]
    fn build_report_empty() {
        let report = build_report(&Buckets::new(), &pricing::fallback_table());
        assert!(report.daily.is_empty());
        assert_eq!(report.totals, Totals::default());
    }

    #[test]
    fn build_report_single_tier_high_record() {
        let table = pricing::fallback_table();
        let today = date(2026, 10, 19);
        let mut buckets = Buckets::new();
        buckets.insert((today, "claude-opus-4-6".to_string()), bucket(1000, 500, 0, 0));

        let report = build_report(&buckets, &table);
        assert_eq!(report.daily.len(), 1);
        let day = &report.daily[0];
        assert_eq!(day.date, today);
        assert_eq!(day.total_tokens, 1500);

        let rates = table["claude-opus-4-6"];
        let expected = 1000.0 * rates.input_per_token + 500.0 * rates.output_per_token;
        assert!((day.total_cost - expected).abs() < 1e-12);
        assert!((report.totals.total_cost - expected).abs() < 1e-12);
    }

    #[test]
    fn build_report_sorts_days_and_models() {
        let table = pricing::fallback_table();
        let mut buckets = Buckets::new();
        buckets.insert((date(2026, 2, 23), "claude-sonnet-4-6".to_string()), bucket(1, 1, 1, 1));
        buckets.insert((date(2026, 2, 21), "claude-opus-4-6".to_string()), bucket(1, 1, 1, 1));
        buckets.insert((date(2026, 2, 23), "claude-haiku-4-5".to_string()), bucket(1, 1, 1, 1));

        let report = build_report(&buckets, &table);
        let dates: Vec<NaiveDate> = report.daily.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date(2026, 2, 21), date(2026, 2, 23)]);
        assert_eq!(
            report.daily[1].models_used,
            vec!["claude-haiku-4-5".to_string(), "claude-sonnet-4-6".to_string()]
        );
    }

    #[test]
    fn day_cost_equals_sum_of_breakdowns() {
        let table = pricing::fallback_table();
        let d = date(2026, 2, 22);
        let mut buckets = Buckets::new();
        buckets.insert((d, "claude-opus-4-6".to_string()), bucket(150_000, 60_000, 15_000, 6_000));
        buckets.insert((d, "claude-sonnet-4-20250514".to_string()), bucket(50_000, 20_000, 5_000, 2_000));
        buckets.insert((d, "claude-haiku-4-5".to_string()), bucket(9, 9, 9, 9));

        let report = build_report(&buckets, &table);
        let day = &report.daily[0];
        let parts: f64 = day.model_breakdowns.iter().map(|b| b.cost).sum();
        assert!((day.total_cost - parts).abs() < 1e-9);
        assert_eq!(day.input_tokens, 200_009);
        assert_eq!(report.totals.total_tokens, day.total_tokens);
    }

    #[test]
    fn unknown_model_is_priced_by_family() {
        let table = pricing::fallback_table();
        let d = date(2026, 2, 22);
        let mut buckets = Buckets::new();
        buckets.insert((d, "claude-sonnet-9".to_string()), bucket(1_000_000, 0, 0, 0));
        let report = build_report(&buckets, &table);
        assert!((report.daily[0].total_cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_report_snapshot() {
        let today = date(2026, 10, 19);
        let snap = derive_snapshot_at(&CostReport::default(), 0, today, None);
        assert_eq!(snap.week.len(), 7);
        assert!(snap.week.iter().all(|d| d.total_cost == 0.0));
        assert_eq!(snap.today_cost, 0.0);
        assert_eq!(snap.month_total, 0.0);
        assert!(snap.earliest_date.is_none());
        assert!(!snap.can_go_back);
        assert!(snap.is_current_week);
    }

    #[test]
    fn window_is_seven_contiguous_ascending_days() {
        let today = date(2026, 3, 3);
        let report = report_of(vec![
            day_with_cost(date(2026, 2, 27), 4.0),
            day_with_cost(date(2026, 3, 3), 2.0),
            day_with_cost(date(2026, 1, 1), 1.0),
        ]);
        for offset in [0, -1, -5, 2] {
            let snap = derive_snapshot_at(&report, offset, today, None);
            assert_eq!(snap.week.len(), 7);
            for pair in snap.week.windows(2) {
                assert_eq!(pair[1].date - pair[0].date, Duration::days(1));
            }
            assert_eq!(snap.week[0].date, snap.week_start);
            assert_eq!(snap.week[6].date, snap.week_end);
        }
        let snap = derive_snapshot_at(&report, 0, today, None);
        assert_eq!(snap.week_start, date(2026, 2, 25));
        assert_eq!(snap.week_end, today);
        assert_eq!(snap.week[2].total_cost, 4.0);
    }

    #[test]
    fn week_total_matches_window_sum() {
        let today = date(2026, 3, 3);
        let report = report_of(vec![
            day_with_cost(date(2026, 2, 27), 4.125),
            day_with_cost(date(2026, 3, 1), 0.333),
            day_with_cost(date(2026, 3, 3), 2.0),
            day_with_cost(date(2026, 2, 20), 100.0),
        ]);
        let snap = derive_snapshot_at(&report, 0, today, None);
        assert!((snap.week_total() - 6.458).abs() < 0.001);
    }

    #[test]
    fn current_week_flag_follows_offset() {
        let today = date(2026, 3, 3);
        let report = report_of(vec![day_with_cost(today, 1.0)]);
        assert!(derive_snapshot_at(&report, 0, today, None).is_current_week);
        assert!(!derive_snapshot_at(&report, -1, today, None).is_current_week);
        assert!(!derive_snapshot_at(&report, 1, today, None).is_current_week);
    }

    #[test]
    fn today_cost_is_independent_of_offset() {
        let today = date(2026, 3, 3);
        let report = report_of(vec![
            day_with_cost(today, 7.5),
            day_with_cost(date(2026, 2, 20), 1.0),
        ]);
        for offset in [0, -1, -2, -10] {
            let snap = derive_snapshot_at(&report, offset, today, None);
            assert_eq!(snap.today_cost, 7.5);
        }
    }

    #[test]
    fn month_total_uses_window_end_month() {
        let report = report_of(vec![
            day_with_cost(date(2026, 1, 10), 20.0),
            day_with_cost(date(2026, 1, 31), 30.0),
            day_with_cost(date(2026, 2, 1), 10.0),
            day_with_cost(date(2026, 2, 15), 20.0),
        ]);
        let today = date(2026, 2, 20);
        let snap = derive_snapshot_at(&report, 0, today, None);
        assert!((snap.month_total - 30.0).abs() < 1e-9);

        // Four weeks back the window ends on 2026-01-23: January's total.
        let snap = derive_snapshot_at(&report, -4, today, None);
        assert_eq!(snap.week_end, date(2026, 1, 23));
        assert!((snap.month_total - 50.0).abs() < 1e-9);
    }

    #[test]
    fn month_total_ignores_same_month_other_year() {
        let report = report_of(vec![
            day_with_cost(date(2025, 2, 10), 99.0),
            day_with_cost(date(2026, 2, 10), 1.0),
        ]);
        let snap = derive_snapshot_at(&report, 0, date(2026, 2, 20), None);
        assert!((snap.month_total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn can_go_back_until_window_reaches_earliest_day() {
        let today = date(2026, 3, 3);
        let report = report_of(vec![
            day_with_cost(date(2026, 2, 18), 1.0),
            day_with_cost(today, 1.0),
        ]);
        // Window 2026-02-25..03-03: earlier data exists.
        assert!(derive_snapshot_at(&report, 0, today, None).can_go_back);
        // Window 2026-02-18..02-24 starts on the earliest day.
        let snap = derive_snapshot_at(&report, -1, today, None);
        assert_eq!(snap.week_start, date(2026, 2, 18));
        assert!(!snap.can_go_back);
        assert!(!derive_snapshot_at(&report, -2, today, None).can_go_back);
        assert_eq!(snap.earliest_date, Some(date(2026, 2, 18)));
    }

    #[test]
    fn can_go_back_false_when_all_data_inside_window() {
        let today = date(2026, 3, 3);
        let report = report_of(vec![day_with_cost(date(2026, 3, 1), 1.0)]);
        assert!(!derive_snapshot_at(&report, 0, today, None).can_go_back);
    }

    #[test]
    fn derive_snapshot_stamps_refresh_time() {
        let snap = derive_snapshot(&CostReport::default(), 0);
        assert!(snap.last_refresh.is_some());
        assert_eq!(snap.week_end, Local::now().date_naive());
    }

    #[test]
    fn extreme_offsets_clamp_to_calendar() {
        let report = report_of(vec![day_with_cost(date(2026, 10, 19), 4.0)]);
        let today = date(2026, 10, 19);

        let far_future = derive_snapshot_at(&report, i32::MAX, today, None);
        assert_eq!(far_future.week_end, NaiveDate::MAX);
        assert_eq!(far_future.week.len(), 7);
        assert_eq!(far_future.week_total(), 0.0);
        assert!(far_future.can_go_back);
        assert!((far_future.today_cost - 4.0).abs() < 1e-9);

        let far_past = derive_snapshot_at(&report, i32::MIN, today, None);
        assert_eq!(far_past.week_start, NaiveDate::MIN);
        assert_eq!(far_past.week.len(), 7);
        assert!(!far_past.can_go_back);
        assert!(!far_past.is_current_week);
    }

    #[test]
    fn large_offset_does_not_overflow() {
        let snap = derive_snapshot_at(&CostReport::default(), 20_000_000, date(2026, 10, 19), None);
        assert_eq!(snap.week_end, NaiveDate::MAX);
        assert_eq!(snap.week_start, NaiveDate::MAX - Duration::days(6));
    }
}
