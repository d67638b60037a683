use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

const TIMEZONE_ENV_VAR: &str = "SATCHEL_TIMEZONE";

static PROJECT_TZ: OnceLock<Tz> = OnceLock::new();

/// Install the timezone from the loaded configuration. A later call, or
/// a call after `project_timezone` already resolved, is a no-op; the
/// environment variable always wins over the config key.
pub fn configure_timezone(raw: Option<&str>) {
    if let Ok(from_env) = std::env::var(TIMEZONE_ENV_VAR) {
        apply_timezone(&from_env, TIMEZONE_ENV_VAR);
        return;
    }

    if let Some(raw) = raw {
        apply_timezone(raw, "config");
    }
}

fn apply_timezone(raw: &str, source: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            if PROJECT_TZ.set(tz).is_ok() {
                tracing::info!(source, timezone = %trimmed, "configured project timezone");
            }
        }
        Err(err) => {
            tracing::error!(source, timezone = %trimmed, error = %err, "failed to parse timezone id");
        }
    }
}

pub fn project_timezone() -> Tz {
    *PROJECT_TZ.get_or_init(|| {
        std::env::var(TIMEZONE_ENV_VAR)
            .ok()
            .and_then(|raw| raw.trim().parse::<Tz>().ok())
            .unwrap_or(chrono_tz::UTC)
    })
}

/// The calendar date "today" means in the configured timezone. Overdue
/// and due-today bucketing both key off this.
#[must_use]
pub fn today_in_project_tz(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&project_timezone()).date_naive()
}

/// Parse a due date as entered on the command line. Due dates are
/// calendar dates only; no time component is kept.
pub fn parse_due_date(input: &str, now: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "today" => return Ok(today_in_project_tz(now)),
        "tomorrow" => {
            return today_in_project_tz(now)
                .checked_add_signed(Duration::days(1))
                .ok_or_else(|| anyhow!("date overflow computing tomorrow"));
        }
        _ => {}
    }

    if let Some(rest) = lower.strip_prefix('+')
        && let Some(days_text) = rest.strip_suffix('d')
    {
        let days: i64 = days_text.parse().context("invalid relative day count")?;
        return today_in_project_tz(now)
            .checked_add_signed(Duration::days(days))
            .ok_or_else(|| anyhow!("date overflow in relative due date"));
    }

    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .map_err(|_| anyhow!("unrecognized due date: {input}"))
        .context("supported formats: today, tomorrow, +Nd, YYYY-MM-DD")
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::parse_due_date;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn parses_absolute_date() {
        let parsed = parse_due_date("2026-04-15", now()).expect("parse date");
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2026, 4, 15).expect("valid date"));
    }

    #[test]
    fn parses_relative_days() {
        let today = super::today_in_project_tz(now());
        let parsed = parse_due_date("+3d", now()).expect("parse relative");
        assert_eq!(parsed, today + chrono::Duration::days(3));
    }

    #[test]
    fn parses_named_days() {
        let today = super::today_in_project_tz(now());
        assert_eq!(parse_due_date("today", now()).expect("today"), today);
        assert_eq!(
            parse_due_date("Tomorrow", now()).expect("tomorrow"),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_due_date("next week", now()).is_err());
        assert!(parse_due_date("2026/04/15", now()).is_err());
    }
}
