use colored::{control, ColoredString, Colorize};

use crate::core::formatter::{
    format_cost, format_cost_bar, format_day_label, format_last_refresh, format_tokens,
    format_week_range,
};
use crate::core::models::cost::DailyUsage;
use crate::core::models::snapshot::UsageSnapshot;

const BAR_WIDTH: usize = 12;

/// Render a snapshot as a colored (or plain) block.
///
/// Layout:
/// ```text
///  Claude spend (Mar 03 – Mar 09)
///   Today     $3.21
///   Week      $12.34  (4.5M tokens)
///   Month     $45.67
///
///   Tue 03    $1.20   [███░░░░░░░░░]
///   ...
///   Mon 09    $3.21   [████████████]
///
///   Updated 2m ago
/// ```
pub fn render_snapshot(snapshot: &UsageSnapshot, show_detailed: bool, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();

    let mut header = format!(
        " Claude spend ({})",
        format_week_range(snapshot.week_start, snapshot.week_end)
    );
    if !snapshot.is_current_week {
        header.push_str(" [past week]");
    }
    lines.push(header.bold().to_string());

    if snapshot.is_current_week {
        lines.push(format!(
            "  {}     {}",
            "Today".cyan(),
            format_cost(snapshot.today_cost)
        ));
    }
    lines.push(format!(
        "  {}      {}  ({} tokens)",
        "Week".cyan(),
        format_cost(snapshot.week_total()),
        format_tokens(snapshot.week_tokens())
    ));
    lines.push(format!(
        "  {}     {}",
        "Month".cyan(),
        format_cost(snapshot.month_total)
    ));
    lines.push(String::new());

    let max_day = snapshot
        .week
        .iter()
        .map(|d| d.total_cost)
        .fold(0.0_f64, f64::max);
    for day in &snapshot.week {
        render_day(&mut lines, day, max_day, show_detailed);
    }

    lines.push(String::new());
    let mut footer = format_last_refresh(snapshot.last_refresh.as_ref());
    if snapshot.can_go_back {
        footer.push_str(" · older weeks available (--week-offset -1)");
    }
    lines.push(format!("  {}", footer.dimmed()));

    lines.join("\n")
}

fn render_day(lines: &mut Vec<String>, day: &DailyUsage, max_day: f64, show_detailed: bool) {
    let label = format!("{:<8}", format_day_label(day.date));
    let cost = format!("{:<8}", format_cost(day.total_cost));
    let bar = format_cost_bar(day.total_cost, max_day, BAR_WIDTH);

    lines.push(format!(
        "  {}  {} {}",
        label.cyan(),
        color_by_share(day.total_cost, max_day, &cost),
        bar.magenta()
    ));

    if !show_detailed {
        return;
    }
    for model in &day.model_breakdowns {
        let in_tok = format_tokens(model.input_tokens);
        let out_tok = format_tokens(model.output_tokens);
        let cache_tok = format_tokens(
            model
                .cache_creation_tokens
                .saturating_add(model.cache_read_tokens),
        );
        let line = format!(
            "    {:<24} {:<8} ({} in / {} out / {} cache)",
            model.model_name,
            format_cost(model.cost),
            in_tok,
            out_tok,
            cache_tok
        );
        lines.push(line.dimmed().to_string());
    }
}

/// Highlight the heaviest days of the window.
fn color_by_share(value: f64, max: f64, text: &str) -> ColoredString {
    if max <= 0.0 || value <= 0.0 {
        return text.dimmed();
    }
    let share = value / max;
    if share >= 0.75 {
        text.red()
    } else if share >= 0.4 {
        text.yellow()
    } else {
        text.green()
    }
}

/// One-line notice for a failed refresh, shown under the last good snapshot.
pub fn render_error(message: &str, use_color: bool) -> String {
    control::set_override(use_color);
    format!("  {} {}", "Refresh failed:".red().bold(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::cost::ModelBreakdown;
    use chrono::{Duration, NaiveDate, Utc};

    fn make_snapshot(is_current_week: bool) -> UsageSnapshot {
        let end = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let week: Vec<DailyUsage> = (0..7)
            .map(|i| {
                let mut day = DailyUsage::empty(end - Duration::days(6 - i));
                day.total_cost = i as f64;
                day.total_tokens = 1_000 * i as u64;
                day
            })
            .collect();
        UsageSnapshot {
            today_cost: 6.0,
            week,
            month_total: 45.67,
            is_current_week,
            week_start: end - Duration::days(6),
            week_end: end,
            earliest_date: Some(end - Duration::days(30)),
            can_go_back: true,
            last_refresh: Some(Utc::now()),
        }
    }

    #[test]
    fn render_contains_totals() {
        let output = render_snapshot(&make_snapshot(true), false, false);
        assert!(output.contains("Today"));
        assert!(output.contains("$6.00"));
        assert!(output.contains("$21.00"));
        assert!(output.contains("$45.67"));
        assert!(output.contains("21.0K tokens"));
    }

    #[test]
    fn render_lists_seven_days() {
        let output = render_snapshot(&make_snapshot(true), false, false);
        assert!(output.contains("Mar 03 – Mar 09"));
        assert!(output.contains("Tue 03"));
        assert!(output.contains("Mon 09"));
        assert_eq!(output.matches('[').count(), 7);
    }

    #[test]
    fn past_week_hides_today() {
        let output = render_snapshot(&make_snapshot(false), false, false);
        assert!(output.contains("[past week]"));
        assert!(!output.contains("Today"));
    }

    #[test]
    fn render_mentions_older_weeks() {
        let mut snapshot = make_snapshot(true);
        let output = render_snapshot(&snapshot, false, false);
        assert!(output.contains("older weeks available"));

        snapshot.can_go_back = false;
        let output = render_snapshot(&snapshot, false, false);
        assert!(!output.contains("older weeks available"));
    }

    #[test]
    fn detailed_mode_lists_models() {
        let mut snapshot = make_snapshot(true);
        snapshot.week[6].model_breakdowns.push(ModelBreakdown {
            model_name: "claude-sonnet-4-6".to_string(),
            input_tokens: 1_200,
            output_tokens: 300,
            cache_creation_tokens: 0,
            cache_read_tokens: 2_000_000,
            cost: 6.0,
        });

        let compact = render_snapshot(&snapshot, false, false);
        assert!(!compact.contains("claude-sonnet-4-6"));

        let detailed = render_snapshot(&snapshot, true, false);
        assert!(detailed.contains("claude-sonnet-4-6"));
        assert!(detailed.contains("1.2K in / 300 out / 2.0M cache"));
    }

    #[test]
    fn render_no_ansi_when_color_false() {
        let output = render_snapshot(&make_snapshot(true), true, false);
        assert!(!output.contains('\x1b'), "output should not contain ANSI codes");
    }

    #[test]
    fn render_error_line() {
        let output = render_error("Refresh timed out after 30s", false);
        assert_eq!(output, "  Refresh failed: Refresh timed out after 30s");
    }
}
