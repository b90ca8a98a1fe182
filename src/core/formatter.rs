use chrono::{DateTime, NaiveDate, Utc};

/// Returns "1.2M", "3.4K" or the plain count.
pub fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        format!("{}", count)
    }
}

/// Returns "$12.34". Amounts under a cent but above zero show as "<$0.01".
pub fn format_cost(cost: f64) -> String {
    if cost > 0.0 && cost < 0.005 {
        "<$0.01".to_string()
    } else {
        format!("${:.2}", cost.max(0.0))
    }
}

/// Returns "Mon 03" for a day row.
pub fn format_day_label(date: NaiveDate) -> String {
    date.format("%a %d").to_string()
}

/// Returns "Mar 03 – Mar 09" for a week window.
pub fn format_week_range(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} – {}", start.format("%b %d"), end.format("%b %d"))
}

/// Returns "Updated just now", "Updated 5m ago", "Updated 2h ago" or "Updated 3d ago".
pub fn format_last_refresh(last_refresh: Option<&DateTime<Utc>>) -> String {
    let Some(at) = last_refresh else {
        return "Never updated".to_string();
    };
    let seconds = (Utc::now() - *at).num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if minutes < 1 {
        "Updated just now".to_string()
    } else if hours < 1 {
        format!("Updated {}m ago", minutes)
    } else if hours < 24 {
        format!("Updated {}h ago", hours)
    } else {
        format!("Updated {}d ago", hours / 24)
    }
}

/// Returns "[████░░░░]" where █ is `value`'s share of `max`.
/// Width is the number of block characters inside the brackets.
pub fn format_cost_bar(value: f64, max: f64, width: usize) -> String {
    let share = if max > 0.0 {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled_blocks = (share * width as f64).round() as usize;
    let empty_blocks = width.saturating_sub(filled_blocks);

    format!("[{}{}]", "█".repeat(filled_blocks), "░".repeat(empty_blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn format_tokens_scales() {
        assert_eq!(format_tokens(999), "999");
        assert_eq!(format_tokens(1_500), "1.5K");
        assert_eq!(format_tokens(2_340_000), "2.3M");
    }

    #[test]
    fn format_cost_two_decimals() {
        assert_eq!(format_cost(123.456), "$123.46");
        assert_eq!(format_cost(0.0), "$0.00");
        assert_eq!(format_cost(0.001), "<$0.01");
    }

    #[test]
    fn format_day_label_weekday_and_day() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(format_day_label(date), "Mon 02");
    }

    #[test]
    fn format_week_range_both_ends() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(format_week_range(start, end), "Mar 03 – Mar 09");
    }

    #[test]
    fn format_last_refresh_buckets() {
        assert_eq!(format_last_refresh(None), "Never updated");
        let now = Utc::now();
        assert_eq!(format_last_refresh(Some(&now)), "Updated just now");
        let earlier = now - Duration::minutes(7);
        assert_eq!(format_last_refresh(Some(&earlier)), "Updated 7m ago");
        let hours = now - Duration::minutes(150);
        assert_eq!(format_last_refresh(Some(&hours)), "Updated 2h ago");
        let days = now - Duration::hours(50);
        assert_eq!(format_last_refresh(Some(&days)), "Updated 2d ago");
    }

    #[test]
    fn format_cost_bar_width() {
        assert_eq!(format_cost_bar(0.0, 10.0, 8), "[░░░░░░░░]");
        assert_eq!(format_cost_bar(10.0, 10.0, 8), "[████████]");
        assert_eq!(format_cost_bar(5.0, 10.0, 8), "[████░░░░]");
        // No spend anywhere in the week.
        assert_eq!(format_cost_bar(0.0, 0.0, 4), "[░░░░]");
    }
}
