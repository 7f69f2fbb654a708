use chrono::{Days, Months, NaiveDate, NaiveDateTime};

use campus_tasks::{EndCondition, Frequency, RepeatConfig, Task};

/// Compute the due instant of the occurrence that follows `task`.
///
/// The base is the instant `task` itself was due, not the current time, so a
/// late fire never drifts the series. Returns `None` when the series is over:
/// the task is not `Custom`, the `After` count is reached, or the next instant
/// falls past the end of the `OnDate` day.
pub fn compute_next(task: &Task) -> Option<NaiveDateTime> {
    let RepeatConfig::Custom {
        interval,
        frequency,
        end_condition,
    } = task.repeat_config
    else {
        return None;
    };

    if let EndCondition::After(count) = end_condition {
        if task.occurrence_count >= count {
            return None;
        }
    }

    let next = add_interval(task.due_at(), interval.get(), frequency)?;

    match end_condition {
        EndCondition::OnDate(date) if next > end_of_day(date)? => None,
        _ => Some(next),
    }
}

/// Calendar-aware addition of `n` units of `frequency`.
///
/// Months and years follow chrono's `checked_add_months`: a day that does not
/// exist in the target month is clamped to that month's last day
/// (Jan 31 + 1 month = Feb 28/29, Feb 29 + 1 year = Feb 28).
pub fn add_interval(base: NaiveDateTime, n: u32, frequency: Frequency) -> Option<NaiveDateTime> {
    match frequency {
        Frequency::Days => base.checked_add_days(Days::new(u64::from(n))),
        Frequency::Weeks => base.checked_add_days(Days::new(u64::from(n) * 7)),
        Frequency::Months => base.checked_add_months(Months::new(n)),
        Frequency::Years => base.checked_add_months(Months::new(n.checked_mul(12)?)),
    }
}

fn end_of_day(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_opt(23, 59, 59)
}
