//! Next-run computation for each [`Schedule`] variant.
//!
//! Grounded on the teacher's `skynet-scheduler/src/schedule.rs`
//! `compute_next_run()`, generalised from UTC-only `Daily`/`Weekly` to
//! timezone-aware `Cron`/`FixedTimes`/`Windowed` per §6. The teacher's
//! `Cron` branch was an explicit "not yet supported" stub; here it is a
//! real `cron`-crate lookup.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::types::Schedule;

/// Compute the next UTC execution time for `schedule` starting strictly
/// after `from`. Returns `None` if the schedule's timezone cannot be
/// resolved or the underlying expression yields no further occurrence.
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Cron { expression, tz } => {
            let tz: Tz = Tz::from_str(tz).ok()?;
            let six_field = format!("0 {expression}");
            let cron_schedule = cron::Schedule::from_str(&six_field).ok()?;
            let local_from = from.with_timezone(&tz);
            cron_schedule
                .after(&local_from)
                .next()
                .map(|dt| dt.with_timezone(&Utc))
        }

        Schedule::FixedTimes { times, tz } => {
            let tz: Tz = Tz::from_str(tz).ok()?;
            let local_from = from.with_timezone(&tz);
            next_clock_time(&local_from, times).map(|dt| dt.with_timezone(&Utc))
        }

        Schedule::Windowed {
            every_secs,
            from: window_from,
            to: window_to,
            tz,
        } => {
            let tz: Tz = Tz::from_str(tz).ok()?;
            let local_from = from.with_timezone(&tz);
            next_windowed_tick(&local_from, *every_secs, *window_from, *window_to)
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

/// Smallest `HH:MM` in `times` strictly after `from`'s local clock time,
/// rolling to the next day if every entry for today has passed.
fn next_clock_time(from: &DateTime<Tz>, times: &[(u8, u8)]) -> Option<DateTime<Tz>> {
    use chrono::{Datelike, Duration, Timelike};

    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    if sorted.is_empty() {
        return None;
    }

    let today_candidates: Vec<_> = sorted
        .iter()
        .filter_map(|(h, m)| {
            from.timezone()
                .with_ymd_and_hms(from.year(), from.month(), from.day(), *h as u32, *m as u32, 0)
                .single()
        })
        .filter(|candidate| candidate > from)
        .collect();

    if let Some(next) = today_candidates.into_iter().min() {
        return Some(next);
    }

    // Everything today has passed — use the earliest time tomorrow.
    let (h, m) = sorted[0];
    let tomorrow = *from + Duration::days(1);
    from.timezone()
        .with_ymd_and_hms(tomorrow.year(), tomorrow.month(), tomorrow.day(), h as u32, m as u32, 0)
        .single()
}

/// The next tick of an `every N from HH:MM to HH:MM` window. Ticks are
/// anchored to the window's opening time, not to `from`, so the schedule is
/// stable across restarts.
fn next_windowed_tick(
    from: &DateTime<Tz>,
    every_secs: u64,
    window_from: (u8, u8),
    window_to: (u8, u8),
) -> Option<DateTime<Tz>> {
    use chrono::{Datelike, Duration};

    let open_today = from
        .timezone()
        .with_ymd_and_hms(
            from.year(),
            from.month(),
            from.day(),
            window_from.0 as u32,
            window_from.1 as u32,
            0,
        )
        .single()?;
    let close_today = from
        .timezone()
        .with_ymd_and_hms(
            from.year(),
            from.month(),
            from.day(),
            window_to.0 as u32,
            window_to.1 as u32,
            0,
        )
        .single()?;

    let step = Duration::seconds(every_secs as i64);

    let candidate_today = if *from < open_today {
        Some(open_today)
    } else {
        // Smallest open_today + k*step strictly greater than `from`.
        let elapsed = (*from - open_today).num_seconds().max(0);
        let steps_elapsed = elapsed / every_secs as i64 + 1;
        let next = open_today + step * steps_elapsed as i32;
        if next <= close_today {
            Some(next)
        } else {
            None
        }
    };

    if let Some(c) = candidate_today {
        if c <= close_today {
            return Some(c);
        }
    }

    // Window already closed for today — open tomorrow.
    let tomorrow = *from + Duration::days(1);
    from.timezone()
        .with_ymd_and_hms(
            tomorrow.year(),
            tomorrow.month(),
            tomorrow.day(),
            window_from.0 as u32,
            window_from.1 as u32,
            0,
        )
        .single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cron_schedule_resolves_next_occurrence_in_timezone() {
        let schedule = Schedule::Cron {
            expression: "0 9,11,13 * * *".to_string(),
            tz: "UTC".to_string(),
        };
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 9, 30, 0).unwrap();
        let next = compute_next_run(&schedule, from).expect("next run");
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn fixed_times_rolls_to_next_day_when_exhausted() {
        let schedule = Schedule::FixedTimes {
            times: vec![(8, 0), (12, 30)],
            tz: "UTC".to_string(),
        };
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 13, 0, 0).unwrap();
        let next = compute_next_run(&schedule, from).expect("next run");
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 8, 0, 0).unwrap());
    }

    #[test]
    fn windowed_schedule_ticks_inside_window() {
        let schedule = Schedule::Windowed {
            every_secs: 7200,
            from: (9, 0),
            to: (21, 0),
            tz: "UTC".to_string(),
        };
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 0).unwrap();
        let next = compute_next_run(&schedule, from).expect("next run");
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn windowed_schedule_rolls_to_next_day_after_close() {
        let schedule = Schedule::Windowed {
            every_secs: 7200,
            from: (9, 0),
            to: (21, 0),
            tz: "UTC".to_string(),
        };
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 21, 30, 0).unwrap();
        let next = compute_next_run(&schedule, from).expect("next run");
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn unknown_timezone_yields_none() {
        let schedule = Schedule::Cron {
            expression: "0 9 * * *".to_string(),
            tz: "Mars/OlympusMons".to_string(),
        };
        let from = Utc::now();
        assert!(compute_next_run(&schedule, from).is_none());
    }
}
