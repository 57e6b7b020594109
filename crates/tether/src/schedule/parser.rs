use super::clock::parse_clock;
use super::phrase::{parse_phrase, weekday_from_name};
use super::TimeExpression;
use chrono::{DateTime, Duration, Local, TimeZone, Utc, Weekday};
use regex::Regex;
use std::sync::OnceLock;

struct RecurringPatterns {
    every_n_minutes: Regex,
    every_n_hours: Regex,
    every_hour: Regex,
    every_minute: Regex,
    daily: Regex,
    weekdays: Regex,
    weekends: Regex,
    named_day: Regex,
}

fn recurring_patterns() -> &'static RecurringPatterns {
    static PATTERNS: OnceLock<RecurringPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("recurring pattern");
        RecurringPatterns {
            every_n_minutes: re(r"^every (\d+) (?:minutes?|mins?)$"),
            every_n_hours: re(r"^every (\d+) (?:hours?|hrs?)$"),
            every_hour: re(r"^every hour$"),
            every_minute: re(r"^every minute$"),
            daily: re(r"^(?:every day|everyday|daily) at (.+)$"),
            weekdays: re(r"^every weekdays? at (.+)$"),
            weekends: re(r"^every weekends? at (.+)$"),
            named_day: re(r"^every ([a-z]+?)s? at (.+)$"),
        }
    })
}

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:in (\d+|an?) (seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?)|(\d+|an?) (seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?) from now)$",
        )
        .expect("relative pattern")
    })
}

fn normalize(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn positive(count: &str) -> Option<u32> {
    count.parse::<u32>().ok().filter(|n| *n > 0)
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        format!("Every {unit}")
    } else {
        format!("Every {n} {unit}s")
    }
}

fn recurring(cron: String, description: String) -> Option<TimeExpression> {
    Some(TimeExpression::Recurring { cron, description })
}

/// Match the "every …" family and map it to a 5-field cron expression.
pub fn parse_recurring(text: &str) -> Option<TimeExpression> {
    let p = recurring_patterns();

    if let Some(caps) = p.every_n_minutes.captures(text) {
        let n = positive(&caps[1])?;
        return recurring(format!("*/{n} * * * *"), plural(n, "minute"));
    }
    if let Some(caps) = p.every_n_hours.captures(text) {
        let n = positive(&caps[1])?;
        return recurring(format!("0 */{n} * * *"), plural(n, "hour"));
    }
    if p.every_hour.is_match(text) {
        return recurring("0 * * * *".into(), "Every hour".into());
    }
    if p.every_minute.is_match(text) {
        return recurring("* * * * *".into(), "Every minute".into());
    }
    if let Some(caps) = p.daily.captures(text) {
        let t = parse_clock(&caps[1])?;
        return recurring(
            format!("{} {} * * *", t.minute, t.hour),
            format!("Every day at {t}"),
        );
    }
    if let Some(caps) = p.weekdays.captures(text) {
        let t = parse_clock(&caps[1])?;
        return recurring(
            format!("{} {} * * 1-5", t.minute, t.hour),
            format!("Every weekday at {t}"),
        );
    }
    if let Some(caps) = p.weekends.captures(text) {
        let t = parse_clock(&caps[1])?;
        return recurring(
            format!("{} {} * * 0,6", t.minute, t.hour),
            format!("Every weekend at {t}"),
        );
    }
    if let Some(caps) = p.named_day.captures(text) {
        let day = weekday_from_name(&caps[1])?;
        let t = parse_clock(&caps[2])?;
        return recurring(
            format!("{} {} * * {}", t.minute, t.hour, day.num_days_from_sunday()),
            format!("Every {} at {t}", weekday_title(day)),
        );
    }
    None
}

fn weekday_title(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn unit_seconds(unit: &str) -> i64 {
    match unit.chars().next() {
        Some('s') => 1,
        Some('m') => 60,
        Some('h') => 60 * 60,
        Some('d') => 24 * 60 * 60,
        _ => 7 * 24 * 60 * 60,
    }
}

/// `in N <unit>` / `N <unit> from now`.
pub fn parse_relative<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let caps = relative_re().captures(text)?;
    let count = caps.get(1).or_else(|| caps.get(3))?.as_str();
    let unit = caps.get(2).or_else(|| caps.get(4))?.as_str();

    let n: i64 = match count {
        "a" | "an" => 1,
        digits => digits.parse().ok()?,
    };
    let seconds = n.checked_mul(unit_seconds(unit))?;
    now.clone().checked_add_signed(Duration::try_seconds(seconds)?)
}

// "5pm" typed after 5pm means tomorrow; anything else in the past stays put.
fn roll_forward<Tz: TimeZone>(at: DateTime<Tz>, now: &DateTime<Tz>) -> DateTime<Tz> {
    if at < *now && at.date_naive() == now.date_naive() {
        at + Duration::days(1)
    } else {
        at
    }
}

/// Parse a reminder time against the local clock.
pub fn parse_time_expression(input: &str) -> Option<TimeExpression> {
    parse_time_expression_at(input, &Local::now())
}

/// Parse a reminder time against an explicit `now`.
///
/// Recurring patterns win over relative durations, which win over free
/// phrases. Returns `None` when nothing matches the whole input.
pub fn parse_time_expression_at<Tz: TimeZone>(
    input: &str,
    now: &DateTime<Tz>,
) -> Option<TimeExpression> {
    let text = normalize(input);
    if text.is_empty() {
        return None;
    }

    if let Some(expr) = parse_recurring(&text) {
        return Some(expr);
    }

    let at = match parse_relative(&text, now) {
        Some(at) => at,
        None => roll_forward(parse_phrase(&text, now)?, now),
    };

    Some(TimeExpression::Once {
        at: at.with_timezone(&Utc),
        text: input.trim().to_string(),
    })
}
