//! Date and time functions.
//!
//! Datetimes are fractional unix seconds tagged with a display zone. Only
//! `UTC` and fixed offsets (`+05:30`, `-0800`) are understood as zones.

use std::fmt::Write;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};

use hogvm_core::{
    VmError, VmResult,
    module::{Module, StlContext, StlFunction, num_arg, str_arg},
    val::{HogDate, HogDateTime, Value},
};

const UTC: &str = "UTC";

#[derive(Debug, Default)]
pub struct DateTimeModule;

/// Parses a zone name into its UTC offset.
pub fn parse_zone(zone: &str) -> VmResult<FixedOffset> {
    let unsupported = || VmError::InvalidOperation(format!("Unsupported time zone: {zone}"));
    let zone = zone.trim();
    if matches!(zone, "UTC" | "utc" | "GMT" | "Z" | "Etc/UTC" | "Etc/GMT") {
        return Ok(utc_offset());
    }
    let (sign, rest) = match zone.as_bytes().first() {
        Some(b'+') => (1, &zone[1..]),
        Some(b'-') => (-1, &zone[1..]),
        _ => return Err(unsupported()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(unsupported());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| unsupported())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| unsupported())?;
    if hours > 23 || minutes > 59 {
        return Err(unsupported());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(unsupported)
}

fn seconds_to_chrono(ts: f64, offset: FixedOffset) -> VmResult<DateTime<FixedOffset>> {
    let out_of_range = || VmError::InvalidOperation(format!("Timestamp {ts} is out of range"));
    if !ts.is_finite() {
        return Err(out_of_range());
    }
    let secs = ts.floor();
    let nanos = (((ts - secs) * 1e9).round() as u32).min(999_999_999);
    let utc = Utc.timestamp_opt(secs as i64, nanos).single().ok_or_else(out_of_range)?;
    Ok(utc.with_timezone(&offset))
}

fn chrono_to_seconds<Tz: TimeZone>(dt: &DateTime<Tz>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1e6
}

fn to_chrono(dt: &HogDateTime) -> VmResult<DateTime<FixedOffset>> {
    seconds_to_chrono(dt.dt, parse_zone(&dt.zone)?)
}

fn naive_date(date: &HogDate) -> VmResult<NaiveDate> {
    let invalid = || VmError::InvalidOperation(format!("Invalid date {}-{}-{}", date.year, date.month, date.day));
    let year = i32::try_from(date.year).map_err(|_| invalid())?;
    let month = u32::try_from(date.month).map_err(|_| invalid())?;
    let day = u32::try_from(date.day).map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn local_to_seconds(naive: NaiveDateTime, offset: FixedOffset) -> VmResult<f64> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| chrono_to_seconds(&dt))
        .ok_or_else(|| VmError::InvalidOperation(format!("Invalid local time {naive}")))
}

/// Parses ISO-8601 style text. Text without an explicit offset is read in
/// `offset`.
fn parse_datetime_str(text: &str, offset: FixedOffset) -> VmResult<f64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(chrono_to_seconds(&dt));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return local_to_seconds(naive, offset);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return local_to_seconds(date.and_time(NaiveTime::MIN), offset);
    }
    Err(VmError::InvalidOperation(format!("Cannot parse '{text}' as a date or datetime")))
}

/// Unix seconds of any time-like value. Dates count from their midnight in
/// `offset`.
fn to_seconds(name: &str, value: &Value, offset: FixedOffset) -> VmResult<f64> {
    match value {
        Value::DateTime(dt) => Ok(dt.dt),
        Value::Date(date) => local_to_seconds(naive_date(date)?.and_time(NaiveTime::MIN), offset),
        Value::Int(_) | Value::Float(_) => Ok(value.as_f64().unwrap_or_default()),
        Value::Str(s) => parse_datetime_str(s, offset),
        other => Err(VmError::type_mismatch(format!(
            "{name}() expects a date, datetime, string or number, got {}",
            other.type_name()
        ))),
    }
}

fn date_value<D: Datelike>(date: &D) -> Value {
    Value::Date(HogDate::new(
        i64::from(date.year()),
        i64::from(date.month()),
        i64::from(date.day()),
    ))
}

/// Calendar date of a time-like value, in the value's own zone.
fn calendar_date(name: &str, value: &Value) -> VmResult<NaiveDate> {
    match value {
        Value::Date(date) => naive_date(date),
        Value::DateTime(dt) => Ok(to_chrono(dt)?.date_naive()),
        Value::Str(s) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(date) => Ok(date),
            Err(_) => Ok(seconds_to_chrono(parse_datetime_str(s, utc_offset())?, utc_offset())?.date_naive()),
        },
        other => Ok(seconds_to_chrono(to_seconds(name, other, utc_offset())?, utc_offset())?.date_naive()),
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Optional zone argument at `idx`, validated.
fn zone_arg(name: &str, args: &[Value], idx: usize) -> VmResult<Option<(String, FixedOffset)>> {
    match args.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => {
            let zone = str_arg(name, args, idx)?;
            Ok(Some((zone.to_string(), parse_zone(zone)?)))
        }
    }
}

/// Renders `dt` with ClickHouse `formatDateTime` specifiers.
pub fn format_clickhouse(dt: &DateTime<FixedOffset>, format: &str) -> String {
    let mut out = String::with_capacity(format.len() + 16);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(spec) = chars.next() else {
            out.push('%');
            break;
        };
        let chrono_spec = match spec {
            'a' => "%a",
            'b' => "%b",
            'c' | 'm' => "%m",
            'C' => "%C",
            'd' => "%d",
            'D' => "%m/%d/%y",
            'e' => "%e",
            'f' => "%6f",
            'F' => "%Y-%m-%d",
            'G' => "%G",
            'g' => "%g",
            'h' | 'I' => "%I",
            'H' => "%H",
            'i' | 'M' => "%M",
            'j' => "%j",
            'k' => "%k",
            'l' => "%l",
            'p' => "%p",
            'r' => "%I:%M %p",
            'R' => "%H:%M",
            's' | 'S' => "%S",
            'T' => "%H:%M:%S",
            'u' => "%u",
            'V' => "%V",
            'w' => "%w",
            'W' => "%A",
            'y' => "%y",
            'Y' => "%Y",
            'z' => "%z",
            'n' => "\n",
            't' => "\t",
            '%' => "%%",
            'Q' => {
                let _ = write!(out, "{}", dt.month0() / 3 + 1);
                continue;
            }
            other => {
                out.push('%');
                out.push(other);
                continue;
            }
        };
        let _ = write!(out, "{}", dt.format(chrono_spec));
    }
    out
}

impl DateTimeModule {
    pub fn new() -> Self {
        Self
    }

    fn now(_args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        let now = ctx.now();
        Ok(Value::DateTime(HogDateTime::utc(chrono_to_seconds(&now))))
    }

    fn to_unix_timestamp(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let offset = zone_arg("toUnixTimestamp", args, 1)?.map_or_else(utc_offset, |(_, offset)| offset);
        Ok(Value::Float(to_seconds("toUnixTimestamp", &args[0], offset)?))
    }

    fn from_unix_timestamp(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let ts = num_arg("fromUnixTimestamp", args, 0)?;
        seconds_to_chrono(ts, utc_offset())?;
        Ok(Value::DateTime(HogDateTime::utc(ts)))
    }

    fn to_unix_timestamp_milli(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let offset = zone_arg("toUnixTimestampMilli", args, 1)?.map_or_else(utc_offset, |(_, offset)| offset);
        let seconds = to_seconds("toUnixTimestampMilli", &args[0], offset)?;
        Ok(Value::Int((seconds * 1000.0).round() as i64))
    }

    fn from_unix_timestamp_milli(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let ts = num_arg("fromUnixTimestampMilli", args, 0)? / 1000.0;
        seconds_to_chrono(ts, utc_offset())?;
        Ok(Value::DateTime(HogDateTime::utc(ts)))
    }

    fn to_date(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        Ok(date_value(&calendar_date("toDate", &args[0])?))
    }

    /// `toDateTime(value, zone?)`. Without a zone, datetimes keep theirs and
    /// everything else is read as UTC.
    fn to_date_time(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let zone = zone_arg("toDateTime", args, 1)?;
        if let (Value::DateTime(dt), None) = (&args[0], &zone) {
            return Ok(Value::DateTime(dt.clone()));
        }
        let (zone, offset) = zone.unwrap_or_else(|| (UTC.to_string(), utc_offset()));
        let seconds = to_seconds("toDateTime", &args[0], offset)?;
        seconds_to_chrono(seconds, offset)?;
        Ok(Value::DateTime(HogDateTime::new(seconds, zone)))
    }

    fn to_time_zone(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let zone = str_arg("toTimeZone", args, 1)?;
        parse_zone(zone)?;
        match &args[0] {
            Value::Null => Ok(Value::Null),
            Value::DateTime(dt) => Ok(Value::DateTime(HogDateTime::new(dt.dt, zone))),
            other => Err(VmError::type_mismatch(format!(
                "toTimeZone() expects a datetime, got {}",
                other.type_name()
            ))),
        }
    }

    /// `formatDateTime(value, format, zone?)`
    fn format_date_time(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let format = str_arg("formatDateTime", args, 1)?;
        let zone = zone_arg("formatDateTime", args, 2)?;
        let dt = match (&args[0], zone) {
            (Value::Null, _) => return Ok(Value::Null),
            (Value::DateTime(dt), None) => to_chrono(dt)?,
            (value, zone) => {
                let offset = zone.map_or_else(utc_offset, |(_, offset)| offset);
                seconds_to_chrono(to_seconds("formatDateTime", value, offset)?, offset)?
            }
        };
        Ok(Value::from(format_clickhouse(&dt, format)))
    }

    fn date_part(name: &str, args: &[Value], part: fn(&NaiveDate) -> i64) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        Ok(Value::Int(part(&calendar_date(name, &args[0])?)))
    }

    fn to_year(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::date_part("toYear", args, |d| i64::from(d.year()))
    }

    fn to_month(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::date_part("toMonth", args, |d| i64::from(d.month()))
    }

    fn to_day_of_month(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::date_part("toDayOfMonth", args, |d| i64::from(d.day()))
    }

    fn to_yyyymm(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::date_part("toYYYYMM", args, |d| i64::from(d.year()) * 100 + i64::from(d.month()))
    }
}

impl Module for DateTimeModule {
    fn name(&self) -> &str {
        "datetime"
    }

    fn description(&self) -> &str {
        "Dates, datetimes and unix timestamps"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![
            StlFunction::impure("now", 0, Some(0), Self::now),
            StlFunction::pure("toUnixTimestamp", 1, Some(2), Self::to_unix_timestamp),
            StlFunction::pure("fromUnixTimestamp", 1, Some(1), Self::from_unix_timestamp),
            StlFunction::pure("toUnixTimestampMilli", 1, Some(2), Self::to_unix_timestamp_milli),
            StlFunction::pure("fromUnixTimestampMilli", 1, Some(1), Self::from_unix_timestamp_milli),
            StlFunction::pure("toDate", 1, Some(1), Self::to_date),
            StlFunction::pure("toDateTime", 1, Some(2), Self::to_date_time),
            StlFunction::pure("toTimeZone", 2, Some(2), Self::to_time_zone),
            StlFunction::pure("formatDateTime", 2, Some(3), Self::format_date_time),
            StlFunction::pure("toYear", 1, Some(1), Self::to_year),
            StlFunction::pure("toMonth", 1, Some(1), Self::to_month),
            StlFunction::pure("toDayOfMonth", 1, Some(1), Self::to_day_of_month),
            StlFunction::pure("toYYYYMM", 1, Some(1), Self::to_yyyymm),
        ]
    }
}
