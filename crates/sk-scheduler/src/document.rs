//! Schedule document parser (§6): a text table with columns
//! `(Job, Skill, Schedule, Channel, Enabled)`.
//!
//! New module — the teacher has no document format, only a programmatic
//! `add_job()` API (`skynet-scheduler/src/engine.rs`). Parsing follows the
//! teacher's `InvalidRow`-style per-row error isolation so one bad row never
//! takes the rest of the document down.

use std::str::FromStr;

use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};
use crate::types::{OverlapPolicy, Schedule, ScheduledJob, TargetChannel};

/// Parse a whole schedule document. Blank lines and lines starting with `#`
/// are ignored. Columns are tab- or multi-space-separated.
///
/// A malformed row is reported in `errors` by its 1-based line number but
/// does not prevent the remaining rows from parsing (§7
/// `ScheduleBindingError`: "the offending row is rejected at reload; other
/// jobs unaffected").
pub fn parse_document(text: &str) -> (Vec<ScheduledJob>, Vec<(usize, SchedulerError)>) {
    let mut jobs = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let row = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_row(trimmed) {
            Ok(job) => jobs.push(job),
            Err(e) => errors.push((row, e)),
        }
    }

    (jobs, errors)
}

fn parse_row(line: &str) -> Result<ScheduledJob> {
    let cols: Vec<&str> = line.split('\t').collect();
    let cols: Vec<&str> = if cols.len() >= 5 {
        cols
    } else {
        line.split_whitespace().collect()
    };

    // The Schedule column itself may contain whitespace (e.g. "every 2h
    // from 09:00 to 21:00 Europe/London"), so a naive whitespace split
    // misaligns columns. Tab-separated is the primary format; fall back to
    // treating the line as `job skill <schedule...> channel enabled`.
    if cols.len() < 5 {
        return Err(SchedulerError::InvalidRow {
            row: 0,
            reason: format!("expected 5 columns, found {}", cols.len()),
        });
    }

    let (job_name, skill_name, schedule_col, channel_col, enabled_col) = if line.contains('\t') {
        let mut it = cols.into_iter();
        (
            it.next().unwrap().trim().to_string(),
            it.next().unwrap().trim().to_string(),
            it.next().unwrap().trim().to_string(),
            it.next().unwrap().trim().to_string(),
            it.next().unwrap().trim().to_string(),
        )
    } else {
        let job_name = cols[0].to_string();
        let skill_name = cols[1].to_string();
        let enabled_col = cols[cols.len() - 1].to_string();
        let channel_col = cols[cols.len() - 2].to_string();
        let schedule_col = cols[2..cols.len() - 2].join(" ");
        (job_name, skill_name, schedule_col, channel_col, enabled_col)
    };

    let schedule = parse_schedule(&schedule_col)?;
    let target_channel = parse_channel(&channel_col)?;
    let enabled = parse_bool(&enabled_col)?;

    Ok(ScheduledJob {
        id: uuid::Uuid::new_v4().to_string(),
        job_name,
        skill_name,
        schedule,
        target_channel,
        enabled,
        overlap_policy: OverlapPolicy::default(),
    })
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "enabled" => Ok(true),
        "no" | "false" | "0" | "disabled" => Ok(false),
        other => Err(SchedulerError::InvalidRow {
            row: 0,
            reason: format!("not a boolean: {other:?}"),
        }),
    }
}

fn validate_tz(tz: &str) -> Result<String> {
    Tz::from_str(tz)
        .map(|_| tz.to_string())
        .map_err(|_| SchedulerError::UnknownTimezone(tz.to_string()))
}

/// `Channel` grammar: identifier followed by optional `!quiet`/`+whatsapp`.
fn parse_channel(s: &str) -> Result<TargetChannel> {
    let mut parts = s.split_whitespace();
    let channel_id = parts
        .next()
        .ok_or_else(|| SchedulerError::InvalidRow {
            row: 0,
            reason: "empty channel column".into(),
        })?
        .to_string();

    let mut bypass_quiet_hours = false;
    let mut mirror_whatsapp = false;
    for flag in parts {
        match flag {
            "!quiet" => bypass_quiet_hours = true,
            "+whatsapp" => mirror_whatsapp = true,
            other => {
                return Err(SchedulerError::InvalidRow {
                    row: 0,
                    reason: format!("unrecognised channel flag: {other:?}"),
                })
            }
        }
    }

    Ok(TargetChannel {
        channel_id,
        bypass_quiet_hours,
        mirror_whatsapp,
    })
}

/// `Schedule` grammar per §6: cron form, fixed-times form, or interval form.
fn parse_schedule(s: &str) -> Result<Schedule> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("every ") {
        return parse_windowed(rest);
    }
    // A crontab's first field is numeric, `*`, or a comma-list of numbers;
    // a fixed-times list's first token is an `HH:MM` clock time.
    let first_token = s.split_whitespace().next().unwrap_or("");
    if first_token.contains(':') {
        return parse_fixed_times(s);
    }
    parse_cron(s)
}

/// `every <duration> from HH:MM to HH:MM <tz>`, e.g. `every 2h from 09:00 to 21:00 Europe/London`.
fn parse_windowed(rest: &str) -> Result<Schedule> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    // duration, "from", HH:MM, "to", HH:MM, tz
    if tokens.len() != 6 || tokens[1] != "from" || tokens[3] != "to" {
        return Err(SchedulerError::InvalidRow {
            row: 0,
            reason: format!("malformed interval schedule: {rest:?}"),
        });
    }
    let every_secs = parse_duration(tokens[0])?;
    let from = parse_hhmm(tokens[2])?;
    let to = parse_hhmm(tokens[4])?;
    let tz = validate_tz(tokens[5])?;
    Ok(Schedule::Windowed {
        every_secs,
        from,
        to,
        tz,
    })
}

/// Simple duration grammar: an integer followed by `s`, `m`, or `h`.
fn parse_duration(s: &str) -> Result<u64> {
    let bad = || SchedulerError::InvalidRow {
        row: 0,
        reason: format!("malformed duration: {s:?}"),
    };
    let (digits, unit) = s.split_at(s.len().saturating_sub(1));
    let n: u64 = digits.parse().map_err(|_| bad())?;
    match unit {
        "s" => Ok(n),
        "m" => Ok(n * 60),
        "h" => Ok(n * 3600),
        _ => Err(bad()),
    }
}

fn parse_hhmm(s: &str) -> Result<(u8, u8)> {
    let bad = || SchedulerError::InvalidRow {
        row: 0,
        reason: format!("malformed clock time: {s:?}"),
    };
    let (h, m) = s.split_once(':').ok_or_else(bad)?;
    let hour: u8 = h.parse().map_err(|_| bad())?;
    let minute: u8 = m.parse().map_err(|_| bad())?;
    if hour > 23 || minute > 59 {
        return Err(bad());
    }
    Ok((hour, minute))
}

/// Comma-separated `HH:MM` list plus a trailing timezone, e.g. `09:00,13:00,18:30 Europe/London`.
fn parse_fixed_times(s: &str) -> Result<Schedule> {
    let mut tokens = s.split_whitespace();
    let list = tokens.next().ok_or_else(|| SchedulerError::InvalidRow {
        row: 0,
        reason: "empty fixed-times schedule".into(),
    })?;
    let tz_token = tokens.next().ok_or_else(|| SchedulerError::InvalidRow {
        row: 0,
        reason: "fixed-times schedule is missing a timezone suffix".into(),
    })?;
    let tz = validate_tz(tz_token)?;
    let times = list
        .split(',')
        .map(|t| parse_hhmm(t.trim()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Schedule::FixedTimes { times, tz })
}

/// 5-field crontab plus an optional trailing named timezone (default UTC).
fn parse_cron(s: &str) -> Result<Schedule> {
    let fields: Vec<&str> = s.split_whitespace().collect();
    let (expr_fields, tz) = match fields.len() {
        5 => (fields, "UTC".to_string()),
        6 => (fields[..5].to_vec(), validate_tz(fields[5])?),
        _ => {
            return Err(SchedulerError::InvalidRow {
                row: 0,
                reason: format!("expected a 5-field crontab expression: {s:?}"),
            })
        }
    };
    let expression = expr_fields.join(" ");
    // Validate eagerly so a bad expression is caught at reload, not at the
    // next tick. The `cron` crate expects 6 fields (seconds-first).
    let six_field = format!("0 {expression}");
    cron::Schedule::from_str(&six_field).map_err(|e| SchedulerError::InvalidRow {
        row: 0,
        reason: format!("invalid cron expression {expression:?}: {e}"),
    })?;
    Ok(Schedule::Cron { expression, tz })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cron_row_with_timezone() {
        let doc = "hydration\thydration\t0 9,11,13,15,17,19,21 * * *\t#food-log\tyes";
        let (jobs, errors) = parse_document(doc);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(jobs.len(), 1);
        match &jobs[0].schedule {
            Schedule::Cron { expression, tz } => {
                assert_eq!(expression, "0 9,11,13,15,17,19,21 * * *");
                assert_eq!(tz, "UTC");
            }
            other => panic!("unexpected schedule: {other:?}"),
        }
        assert_eq!(jobs[0].target_channel.channel_id, "#food-log");
        assert!(jobs[0].enabled);
    }

    #[test]
    fn parses_cron_row_with_explicit_timezone() {
        let doc = "hydration\thydration\t0 9,11,13,15,17,19,21 * * * Europe/London\t#food-log !quiet\tyes";
        let (jobs, errors) = parse_document(doc);
        assert!(errors.is_empty(), "{errors:?}");
        match &jobs[0].schedule {
            Schedule::Cron { tz, .. } => assert_eq!(tz, "Europe/London"),
            other => panic!("unexpected schedule: {other:?}"),
        }
        assert!(jobs[0].target_channel.bypass_quiet_hours);
    }

    #[test]
    fn parses_fixed_times_row() {
        let doc = "reminders\tmorning-brief\t08:00,12:30,18:00 Europe/London\t#general +whatsapp\tyes";
        let (jobs, errors) = parse_document(doc);
        assert!(errors.is_empty(), "{errors:?}");
        match &jobs[0].schedule {
            Schedule::FixedTimes { times, tz } => {
                assert_eq!(times, &vec![(8, 0), (12, 30), (18, 0)]);
                assert_eq!(tz, "Europe/London");
            }
            other => panic!("unexpected schedule: {other:?}"),
        }
        assert!(jobs[0].target_channel.mirror_whatsapp);
    }

    #[test]
    fn parses_windowed_row() {
        let doc = "hydration-nudge\thydration\tevery 2h from 09:00 to 21:00 Europe/London\t#food-log\tyes";
        let (jobs, errors) = parse_document(doc);
        assert!(errors.is_empty(), "{errors:?}");
        match &jobs[0].schedule {
            Schedule::Windowed {
                every_secs,
                from,
                to,
                tz,
            } => {
                assert_eq!(*every_secs, 7200);
                assert_eq!(*from, (9, 0));
                assert_eq!(*to, (21, 0));
                assert_eq!(tz, "Europe/London");
            }
            other => panic!("unexpected schedule: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_timezone() {
        let doc = "hydration\thydration\t0 9 * * * Mars/OlympusMons\t#food-log\tyes";
        let (jobs, errors) = parse_document(doc);
        assert!(jobs.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn duplicate_rows_are_separately_parsed_dedup_happens_at_reload() {
        let doc = "hydration\thydration\t0 9 * * *\t#food-log\tyes\nhydration\thydration\t0 9 * * *\t#food-log\tyes";
        let (jobs, errors) = parse_document(doc);
        assert!(errors.is_empty());
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].identity_key(), jobs[1].identity_key());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let doc = "# comment\n\nhydration\thydration\t0 9 * * *\t#food-log\tyes\n";
        let (jobs, errors) = parse_document(doc);
        assert!(errors.is_empty());
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn bad_row_is_isolated_from_good_rows() {
        let doc = "good\thydration\t0 9 * * *\t#food-log\tyes\nbad\thydration\tnot a schedule\t#food-log\tyes";
        let (jobs, errors) = parse_document(doc);
        assert_eq!(jobs.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 2);
    }
}
