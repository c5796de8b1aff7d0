//! Leave-balance arithmetic: allocation and taken-day aggregation with
//! calendar-year apportionment for spans that cross a year boundary.
//!
//! Everything here is pure; fetching the record sets is the caller's job.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::NaiveDate;

use crate::domain::leave::{LeaveAllocation, LeaveTaken};

pub type RemainingBalance = BTreeMap<String, f64>;

/// Leave types whose allocations carry over an extra year, widening the
/// display lookback window to the current and two prior years.
const CARRY_OVER_TYPES: [&str; 2] = ["Annual Leave", "Rest Days"];

/// Pseudo-type excluded from balance display (it has no accrual).
const UNPAID_LEAVE_TYPE: &str = "Unpaid Leave";

fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((NaiveDate::from_ymd_opt(year, 1, 1)?, NaiveDate::from_ymd_opt(year, 12, 31)?))
}

/// Inclusive count of calendar days a span shares with `year`, floored at 0.
pub fn overlap_days(from: NaiveDate, to: NaiveDate, year: i32) -> i64 {
    let Some((year_start, year_end)) = year_bounds(year) else {
        return 0;
    };
    let start = from.max(year_start);
    let end = to.min(year_end);
    ((end - start).num_days() + 1).max(0)
}

/// Share of a taken leave's reported total days credited to `year`.
///
/// A span entirely inside the year contributes its total as-is; a span
/// crossing a boundary is split proportionally by calendar-day overlap; a
/// span entirely outside contributes 0. Records without a usable date range
/// count fully toward whichever year is asked about.
pub fn apportioned_days(taken: &LeaveTaken, year: i32) -> f64 {
    let (Some(from), Some(to)) = (taken.date_from, taken.date_to) else {
        return taken.days;
    };
    if to < from {
        return 0.0;
    }
    let total_span = (to - from).num_days() + 1;
    let overlap = overlap_days(from, to, year);
    if overlap <= 0 {
        return 0.0;
    }
    if overlap >= total_span {
        return taken.days;
    }
    taken.days * (overlap as f64 / total_span as f64)
}

fn range_overlaps_window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    years: &RangeInclusive<i32>,
) -> bool {
    let Some((window_start, _)) = year_bounds(*years.start()) else {
        return false;
    };
    let Some((_, window_end)) = year_bounds(*years.end()) else {
        return false;
    };
    match (from, to) {
        // Open-ended allocations always count.
        (None, None) => true,
        (Some(from), None) => from <= window_end,
        (None, Some(to)) => to >= window_start,
        (Some(from), Some(to)) => from <= window_end && to >= window_start,
    }
}

/// Sum validated allocations per leave type for one year. Entries with
/// non-positive day counts or no resolvable type name are dropped.
pub fn allocated_by_type(allocations: &[LeaveAllocation], year: i32) -> RemainingBalance {
    allocated_over_window(allocations, year..=year)
}

/// Allocation sum where an allocation counts once if its range overlaps any
/// year of the window.
pub fn allocated_over_window(
    allocations: &[LeaveAllocation],
    years: RangeInclusive<i32>,
) -> RemainingBalance {
    let mut totals = RemainingBalance::new();
    for allocation in allocations {
        if allocation.days <= 0.0 {
            continue;
        }
        let Some(leave_type) = &allocation.leave_type else {
            continue;
        };
        if leave_type.name.is_empty() {
            continue;
        }
        if !range_overlaps_window(allocation.date_from, allocation.date_to, &years) {
            continue;
        }
        *totals.entry(leave_type.name.clone()).or_insert(0.0) += allocation.days;
    }
    totals
}

/// Sum apportioned taken days per leave type for one year.
pub fn taken_by_type(taken: &[LeaveTaken], year: i32) -> RemainingBalance {
    let mut totals = RemainingBalance::new();
    for record in taken {
        if record.days <= 0.0 {
            continue;
        }
        let Some(leave_type) = &record.leave_type else {
            continue;
        };
        if leave_type.name.is_empty() {
            continue;
        }
        let share = apportioned_days(record, year);
        if share > 0.0 {
            *totals.entry(leave_type.name.clone()).or_insert(0.0) += share;
        }
    }
    totals
}

/// Remaining balance per leave type for a single year:
/// `max(0, allocated − taken)`. When `requested_type` is given it is always
/// present in the result, defaulting to 0.
pub fn remaining_for_year(
    allocations: &[LeaveAllocation],
    taken: &[LeaveTaken],
    year: i32,
    requested_type: Option<&str>,
) -> RemainingBalance {
    let allocated = allocated_by_type(allocations, year);
    let used = taken_by_type(taken, year);
    remaining_from_totals(allocated, &used, requested_type)
}

/// Remaining balance over a multi-year window: allocations count once if
/// they overlap the window, taken days are apportioned per year and summed.
pub fn remaining_over_window(
    allocations: &[LeaveAllocation],
    taken: &[LeaveTaken],
    years: RangeInclusive<i32>,
) -> RemainingBalance {
    let allocated = allocated_over_window(allocations, years.clone());
    let mut used = RemainingBalance::new();
    for year in years {
        for (name, share) in taken_by_type(taken, year) {
            *used.entry(name).or_insert(0.0) += share;
        }
    }
    remaining_from_totals(allocated, &used, None)
}

/// Display balances with the per-type lookback window: carry-over types see
/// the current and two prior years, everything else the current and one
/// prior year.
pub fn remaining_for_display(
    allocations: &[LeaveAllocation],
    taken: &[LeaveTaken],
    current_year: i32,
) -> RemainingBalance {
    let wide = remaining_over_window(allocations, taken, current_year - 2..=current_year);
    let narrow = remaining_over_window(allocations, taken, current_year - 1..=current_year);
    let mut balances = RemainingBalance::new();
    for (name, value) in wide {
        if CARRY_OVER_TYPES.contains(&name.as_str()) {
            balances.insert(name, value);
        }
    }
    for (name, value) in narrow {
        if !CARRY_OVER_TYPES.contains(&name.as_str()) {
            balances.insert(name, value);
        }
    }
    balances
}

fn remaining_from_totals(
    allocated: RemainingBalance,
    used: &RemainingBalance,
    requested_type: Option<&str>,
) -> RemainingBalance {
    let mut remaining = RemainingBalance::new();
    for (name, total) in allocated {
        let taken_days = used.get(&name).copied().unwrap_or(0.0);
        remaining.insert(name, (total - taken_days).max(0.0));
    }
    if let Some(name) = requested_type {
        remaining.entry(name.to_owned()).or_insert(0.0);
    }
    remaining
}

/// Convert a fractional day balance to whole hours and minutes at the given
/// working-day length.
pub fn days_to_hours_minutes(days: f64, hours_per_day: f64) -> (i64, i64) {
    let total_hours = days * hours_per_day;
    let mut hours = total_hours.floor() as i64;
    let mut minutes = ((total_hours - total_hours.floor()) * 60.0).round() as i64;
    if minutes == 60 {
        hours += 1;
        minutes = 0;
    }
    (hours, minutes)
}

fn format_days(days: f64) -> String {
    let rounded = (days * 100.0).round() / 100.0;
    if (rounded - rounded.trunc()).abs() < f64::EPSILON {
        format!("{}", rounded.trunc() as i64)
    } else {
        let text = format!("{rounded:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_owned()
    }
}

/// One line per leave type: `Available {type}: {days} days ({H}:{MM})`.
/// The unpaid pseudo-type is never listed.
pub fn format_remaining_message(balances: &RemainingBalance) -> String {
    let mut lines = Vec::new();
    for (name, days) in balances {
        if name == UNPAID_LEAVE_TYPE {
            continue;
        }
        let (hours, minutes) = days_to_hours_minutes(*days, 8.0);
        lines.push(format!("Available {name}: {} days ({hours}:{minutes:02})", format_days(*days)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::domain::leave::{LeaveAllocation, LeaveTaken};
    use crate::domain::record::LinkedRecord;

    use super::{
        apportioned_days, days_to_hours_minutes, format_remaining_message, overlap_days,
        remaining_for_display, remaining_for_year, remaining_over_window,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn allocation(name: &str, days: f64, range: Option<(NaiveDate, NaiveDate)>) -> LeaveAllocation {
        LeaveAllocation {
            leave_type: Some(LinkedRecord::new(1, name)),
            days,
            date_from: range.map(|(from, _)| from),
            date_to: range.map(|(_, to)| to),
        }
    }

    fn taken(name: &str, days: f64, from: NaiveDate, to: NaiveDate) -> LeaveTaken {
        LeaveTaken {
            leave_type: Some(LinkedRecord::new(1, name)),
            days,
            date_from: Some(from),
            date_to: Some(to),
        }
    }

    #[test]
    fn span_inside_year_contributes_total_exactly() {
        let record = taken("Annual Leave", 5.0, date(2025, 3, 3), date(2025, 3, 7));
        assert_eq!(apportioned_days(&record, 2025), 5.0);
    }

    #[test]
    fn span_outside_year_contributes_zero() {
        let record = taken("Annual Leave", 5.0, date(2024, 3, 3), date(2024, 3, 7));
        assert_eq!(apportioned_days(&record, 2025), 0.0);
    }

    #[test]
    fn year_boundary_span_splits_proportionally_and_sums_to_total() {
        // Dec 28 - Jan 3: 7 calendar days, 4 on the December side.
        let record = taken("Annual Leave", 5.0, date(2025, 12, 28), date(2026, 1, 3));
        let december_share = apportioned_days(&record, 2025);
        let january_share = apportioned_days(&record, 2026);

        assert!((december_share - 5.0 * 4.0 / 7.0).abs() < 1e-9);
        assert!((january_share - 5.0 * 3.0 / 7.0).abs() < 1e-9);
        assert!((december_share + january_share - 5.0).abs() < 1e-9);
    }

    #[test]
    fn overlap_clamp_is_inclusive_and_floored() {
        assert_eq!(overlap_days(date(2025, 12, 28), date(2026, 1, 3), 2025), 4);
        assert_eq!(overlap_days(date(2025, 12, 28), date(2026, 1, 3), 2026), 3);
        assert_eq!(overlap_days(date(2024, 1, 1), date(2024, 12, 31), 2025), 0);
    }

    #[test]
    fn remaining_is_allocation_minus_taken_floored_at_zero() {
        let allocations =
            vec![allocation("Annual Leave", 21.0, Some((date(2025, 1, 1), date(2025, 12, 31))))];
        let used = vec![
            taken("Annual Leave", 5.0, date(2025, 2, 10), date(2025, 2, 14)),
            taken("Sick Leave", 2.0, date(2025, 4, 1), date(2025, 4, 2)),
        ];

        let balances = remaining_for_year(&allocations, &used, 2025, None);
        assert_eq!(balances.get("Annual Leave"), Some(&16.0));
        // Sick Leave has no allocation on record, so taken days never push
        // it below zero.
        assert_eq!(balances.get("Sick Leave"), None);
    }

    #[test]
    fn overdrawn_type_floors_at_zero() {
        let allocations =
            vec![allocation("Annual Leave", 3.0, Some((date(2025, 1, 1), date(2025, 12, 31))))];
        let used = vec![taken("Annual Leave", 5.0, date(2025, 2, 10), date(2025, 2, 14))];
        let balances = remaining_for_year(&allocations, &used, 2025, None);
        assert_eq!(balances.get("Annual Leave"), Some(&0.0));
    }

    #[test]
    fn requested_type_defaults_to_zero_without_records() {
        let balances = remaining_for_year(&[], &[], 2025, Some("Annual Leave"));
        assert_eq!(balances.get("Annual Leave"), Some(&0.0));
    }

    #[test]
    fn negative_and_zero_day_entries_are_dropped() {
        let allocations = vec![
            allocation("Annual Leave", 0.0, None),
            allocation("Annual Leave", -2.0, None),
            allocation("Annual Leave", 10.0, None),
        ];
        let balances = remaining_for_year(&allocations, &[], 2025, None);
        assert_eq!(balances.get("Annual Leave"), Some(&10.0));
    }

    #[test]
    fn open_ended_allocation_counts_toward_any_year() {
        let allocations = vec![allocation("Rest Days", 4.0, None)];
        assert_eq!(remaining_for_year(&allocations, &[], 2030, None).get("Rest Days"), Some(&4.0));
        assert_eq!(remaining_for_year(&allocations, &[], 1999, None).get("Rest Days"), Some(&4.0));
    }

    #[test]
    fn window_counts_an_allocation_once_but_sums_taken_per_year() {
        let allocations =
            vec![allocation("Annual Leave", 21.0, Some((date(2024, 1, 1), date(2025, 12, 31))))];
        let used = vec![
            taken("Annual Leave", 3.0, date(2024, 6, 2), date(2024, 6, 4)),
            taken("Annual Leave", 2.0, date(2025, 6, 2), date(2025, 6, 3)),
        ];
        let balances = remaining_over_window(&allocations, &used, 2024..=2025);
        assert_eq!(balances.get("Annual Leave"), Some(&16.0));
    }

    #[test]
    fn display_window_is_wider_for_carry_over_types() {
        let allocations = vec![
            allocation("Annual Leave", 10.0, Some((date(2023, 1, 1), date(2023, 12, 31)))),
            allocation("Sick Leave", 7.0, Some((date(2023, 1, 1), date(2023, 12, 31)))),
        ];
        let balances = remaining_for_display(&allocations, &[], 2025);
        // Two years back still counts for Annual Leave, but Sick Leave's
        // 2023 allocation has aged out of its one-year lookback.
        assert_eq!(balances.get("Annual Leave"), Some(&10.0));
        assert_eq!(balances.get("Sick Leave"), None);
    }

    #[test]
    fn hours_minutes_conversion_uses_eight_hour_days() {
        assert_eq!(days_to_hours_minutes(2.5, 8.0), (20, 0));
        assert_eq!(days_to_hours_minutes(0.0625, 8.0), (0, 30));
        assert_eq!(days_to_hours_minutes(1.0, 8.0), (8, 0));
    }

    #[test]
    fn formatted_message_skips_the_unpaid_pseudo_type() {
        let mut balances = super::RemainingBalance::new();
        balances.insert("Annual Leave".to_owned(), 16.0);
        balances.insert("Unpaid Leave".to_owned(), 0.0);
        let message = format_remaining_message(&balances);
        assert_eq!(message, "Available Annual Leave: 16 days (128:00)");
    }
}
