//! Natural-language date/time phrases: "tomorrow at 9am", "next monday 2pm",
//! "oct 20 at noon", "tonight". Every word has to be understood; a phrase with
//! a single unknown word is rejected as a whole.

use super::clock::{looks_like_clock, parse_clock, TimeOfDay};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatePart {
    /// Days from today; keeps the current time of day when no time is given.
    Relative(i64),
    /// Next occurrence of the weekday, today included.
    Weekday(Weekday),
    /// Next occurrence of the weekday, today excluded.
    NextWeekday(Weekday),
    Calendar(NaiveDate),
    MonthDay(u32, u32),
}

#[derive(Debug, Default)]
struct Phrase {
    date: Option<DatePart>,
    time: Option<TimeOfDay>,
    /// "morning", "tonight" and friends; loses to an explicit time.
    soft_time: Option<TimeOfDay>,
}

impl Phrase {
    fn set_date(&mut self, date: DatePart) -> Option<()> {
        if self.date.replace(date).is_some() {
            return None;
        }
        Some(())
    }

    fn set_time(&mut self, time: TimeOfDay) -> Option<()> {
        if self.time.replace(time).is_some() {
            return None;
        }
        Some(())
    }

    fn set_soft_time(&mut self, time: TimeOfDay) -> Option<()> {
        if self.soft_time.replace(time).is_some() {
            return None;
        }
        Some(())
    }
}

const FILLERS: &[&str] = &["at", "on", "in", "the", "this", "of", "by"];

pub fn weekday_from_name(word: &str) -> Option<Weekday> {
    let day = match word {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

fn month_from_name(word: &str) -> Option<u32> {
    let month = match word {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn day_of_month(token: &str) -> Option<u32> {
    let digits = token.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = &token[digits.len()..];
    if !matches!(suffix, "" | "st" | "nd" | "rd" | "th") || digits.is_empty() {
        return None;
    }
    let day: u32 = digits.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

// "9 am" → "9am", "7 p.m." → "7p.m.", commas dropped.
fn tokenize(text: &str) -> Vec<String> {
    let raw: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    let mut tokens: Vec<String> = Vec::with_capacity(raw.len());
    for token in raw {
        let is_meridiem = matches!(token, "am" | "pm" | "a.m." | "p.m.");
        match tokens.last_mut() {
            Some(prev) if is_meridiem && prev.chars().all(|c| c.is_ascii_digit() || c == ':') => {
                prev.push_str(token)
            }
            _ => tokens.push(token.to_string()),
        }
    }
    tokens
}

fn read_phrase(tokens: &[String]) -> Option<Phrase> {
    let mut phrase = Phrase::default();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_str();
        let prev = if i > 0 { tokens[i - 1].as_str() } else { "" };

        match token {
            t if FILLERS.contains(&t) => {}
            "today" | "now" => phrase.set_date(DatePart::Relative(0))?,
            "tomorrow" | "tmrw" => phrase.set_date(DatePart::Relative(1))?,
            "tonight" => {
                phrase.set_date(DatePart::Relative(0))?;
                phrase.set_soft_time(TimeOfDay { hour: 20, minute: 0 })?;
            }
            "noon" | "midday" => phrase.set_time(TimeOfDay::NOON)?,
            "midnight" => phrase.set_time(TimeOfDay::MIDNIGHT)?,
            "morning" => phrase.set_soft_time(TimeOfDay { hour: 9, minute: 0 })?,
            "afternoon" => phrase.set_soft_time(TimeOfDay { hour: 15, minute: 0 })?,
            "evening" => phrase.set_soft_time(TimeOfDay { hour: 19, minute: 0 })?,
            "next" => {
                let next = tokens.get(i + 1)?.as_str();
                if next == "week" {
                    phrase.set_date(DatePart::Relative(7))?;
                } else {
                    phrase.set_date(DatePart::NextWeekday(weekday_from_name(next)?))?;
                }
                i += 1;
            }
            t if weekday_from_name(t).is_some() => {
                phrase.set_date(DatePart::Weekday(weekday_from_name(t)?))?;
            }
            t if month_from_name(t).is_some() => {
                let month = month_from_name(t)?;
                let day = day_of_month(tokens.get(i + 1)?)?;
                phrase.set_date(DatePart::MonthDay(month, day))?;
                i += 1;
            }
            t if NaiveDate::parse_from_str(t, "%Y-%m-%d").is_ok() => {
                phrase.set_date(DatePart::Calendar(NaiveDate::parse_from_str(t, "%Y-%m-%d").ok()?))?;
            }
            t if looks_like_clock(t) || prev == "at" => phrase.set_time(parse_clock(t)?)?,
            t if day_of_month(t).is_some()
                && tokens.get(i + 1).and_then(|m| month_from_name(m)).is_some() =>
            {
                let day = day_of_month(t)?;
                let month = month_from_name(&tokens[i + 1])?;
                phrase.set_date(DatePart::MonthDay(month, day))?;
                i += 1;
            }
            _ => return None,
        }
        i += 1;
    }

    if phrase.date.is_none() && phrase.time.is_none() && phrase.soft_time.is_none() {
        return None;
    }
    Some(phrase)
}

fn days_until(from: Weekday, to: Weekday) -> i64 {
    let from = from.num_days_from_monday() as i64;
    let to = to.num_days_from_monday() as i64;
    (to - from).rem_euclid(7)
}

fn resolve(phrase: &Phrase, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = now.date();
    let explicit_time = phrase.time.or(phrase.soft_time);

    let (date, default_time) = match phrase.date {
        None => (today, now.time()),
        Some(DatePart::Relative(days)) => (today + Duration::days(days), now.time()),
        Some(DatePart::Weekday(day)) => {
            (today + Duration::days(days_until(today.weekday(), day)), TimeOfDay::NOON.to_naive()?)
        }
        Some(DatePart::NextWeekday(day)) => {
            let mut ahead = days_until(today.weekday(), day);
            if ahead == 0 {
                ahead = 7;
            }
            (today + Duration::days(ahead), TimeOfDay::NOON.to_naive()?)
        }
        Some(DatePart::Calendar(date)) => (date, TimeOfDay::NOON.to_naive()?),
        Some(DatePart::MonthDay(month, day)) => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            let date = if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)?
            } else {
                this_year
            };
            (date, TimeOfDay::NOON.to_naive()?)
        }
    };

    let time = match explicit_time {
        Some(t) => t.to_naive()?,
        None => default_time,
    };
    Some(date.and_time(time))
}

/// Interpret `text` (lowercased, trimmed) relative to `now`, in `now`'s zone.
pub fn parse_phrase<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return None;
    }
    let phrase = read_phrase(&tokens)?;
    let local = resolve(&phrase, now.naive_local())?;
    now.timezone().from_local_datetime(&local).earliest()
}
