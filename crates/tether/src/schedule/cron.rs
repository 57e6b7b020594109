use anyhow::Context;
use chrono::{DateTime, TimeZone};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\*|\*/\d+|\d+(-\d+)?(,\d+(-\d+)?)*)$").expect("cron field regex")
    })
}

/// Syntactic check of a 5-field cron expression
/// (`minute hour day-of-month month day-of-week`).
///
/// Each field must be `*`, `*/N`, a number, or a comma list of numbers and
/// ranges. Values are not range-checked: `99 * * * *` is accepted here and only
/// rejected when a schedule is actually built from it.
pub fn is_valid_cron(expr: &str) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    fields.len() == 5 && fields.iter().all(|f| field_re().is_match(f))
}

const WEEKDAY_NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

fn weekday_name(token: &str) -> anyhow::Result<&'static str> {
    let n: usize = token
        .parse()
        .with_context(|| format!("bad day-of-week value {token:?}"))?;
    WEEKDAY_NAMES
        .get(n)
        .copied()
        .with_context(|| format!("day-of-week {n} out of range"))
}

// The `cron` crate numbers weekdays from Sunday = 1, while classic cron uses
// Sunday = 0. Names mean the same thing to both, so numbers are rewritten.
fn translate_weekday_field(field: &str) -> anyhow::Result<String> {
    if field.starts_with('*') {
        return Ok(field.to_string());
    }

    let mut parts = Vec::new();
    for item in field.split(',') {
        match item.split_once('-') {
            Some((from, to)) => parts.push(format!("{}-{}", weekday_name(from)?, weekday_name(to)?)),
            None => parts.push(weekday_name(item)?.to_string()),
        }
    }
    Ok(parts.join(","))
}

/// Build a `cron::Schedule` from a 5-field expression.
pub fn parse_schedule(expr: &str) -> anyhow::Result<::cron::Schedule> {
    if !is_valid_cron(expr) {
        anyhow::bail!("invalid cron expression: {expr:?}");
    }

    let fields: Vec<&str> = expr.split_whitespace().collect();
    let weekday = translate_weekday_field(fields[4])?;
    let six_field = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], weekday
    );

    ::cron::Schedule::from_str(&six_field)
        .map_err(|e| anyhow::anyhow!("invalid cron expression {expr:?}: {e}"))
}

/// Next instant strictly after `after` at which `expr` fires, in `after`'s zone.
pub fn next_cron_fire<Tz: TimeZone>(
    expr: &str,
    after: &DateTime<Tz>,
) -> anyhow::Result<Option<DateTime<Tz>>> {
    let schedule = parse_schedule(expr)?;
    Ok(schedule.after(after).next())
}
