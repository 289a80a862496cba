//! Best-effort parsing of RSS `<pubDate>` values.
//!
//! Feeds in the wild disagree about RFC 822 dates: numeric offsets, zone
//! abbreviations, both at once, two-digit years. [`normalize_pub_date`] tries
//! a fixed list of layouts in order and falls back to the Unix epoch, so a bad
//! date never blocks ingestion.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// How the trailing zone of a layout is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    /// `-0700`
    Numeric,
    /// `-0700 (MST)`
    NumericWithComment,
    /// `MST`, `GMT`, `UT`
    Named,
    /// `Z` for UTC, otherwise `-0700`
    ZuluOrNumeric,
}

#[derive(Debug)]
struct Layout {
    /// Reference rendering, for logs
    name: &'static str,
    /// Leading `Mon, ` weekday token
    weekday: bool,
    /// chrono format of the date and time between the weekday and the zone
    datetime: &'static str,
    zone: Zone,
}

/// Tried in order; the first layout that parses wins.
const LAYOUTS: [Layout; 6] = [
    Layout {
        name: "Mon, 02 Jan 2006 15:04:05 -0700",
        weekday: true,
        datetime: "%d %b %Y %H:%M:%S",
        zone: Zone::Numeric,
    },
    Layout {
        name: "Mon, 02 Jan 2006 15:04:05 -0700 (MST)",
        weekday: true,
        datetime: "%d %b %Y %H:%M:%S",
        zone: Zone::NumericWithComment,
    },
    Layout {
        name: "Mon, 02 Jan 2006 15:04:05 MST",
        weekday: true,
        datetime: "%d %b %Y %H:%M:%S",
        zone: Zone::Named,
    },
    Layout {
        name: "Mon, 02 Jan 2006 15:04:05 Z0700",
        weekday: true,
        datetime: "%d %b %Y %H:%M:%S",
        zone: Zone::ZuluOrNumeric,
    },
    // RFC 1123Z
    Layout {
        name: "Mon, 02 Jan 2006 15:04:05 -0700",
        weekday: true,
        datetime: "%d %b %Y %H:%M:%S",
        zone: Zone::Numeric,
    },
    // RFC 822Z
    Layout {
        name: "02 Jan 06 15:04 -0700",
        weekday: false,
        datetime: "%d %b %y %H:%M",
        zone: Zone::Numeric,
    },
];

/// Parse a raw publication date, returning the Unix epoch when no known
/// layout matches.
pub fn normalize_pub_date(raw: &str) -> DateTime<Utc> {
    let raw = raw.trim();
    if raw.is_empty() {
        return DateTime::<Utc>::UNIX_EPOCH;
    }

    for layout in &LAYOUTS {
        if let Some(ts) = parse_with(layout, raw) {
            return ts;
        }
    }

    tracing::debug!(raw = %raw, "Unrecognized publication date, using epoch");
    DateTime::<Utc>::UNIX_EPOCH
}

/// Whether `ts` is the sentinel returned for unparseable dates
pub fn is_zero(ts: &DateTime<Utc>) -> bool {
    *ts == DateTime::<Utc>::UNIX_EPOCH
}

fn parse_with(layout: &Layout, raw: &str) -> Option<DateTime<Utc>> {
    let mut rest = raw;

    if layout.zone == Zone::NumericWithComment {
        let open = rest.rfind(" (")?;
        let comment = rest[open + 2..].strip_suffix(')')?;
        if comment.is_empty() || comment.contains(char::is_whitespace) {
            return None;
        }
        rest = &rest[..open];
    }

    if layout.weekday {
        let (day, tail) = rest.split_once(", ")?;
        // Checked for syntax only; a weekday that disagrees with the date is tolerated.
        if !WEEKDAYS.contains(&day) {
            return None;
        }
        rest = tail;
    }

    let (datetime, zone) = rest.rsplit_once(' ')?;
    let offset_secs = match layout.zone {
        Zone::Numeric | Zone::NumericWithComment => numeric_offset(zone)?,
        Zone::Named => named_offset(zone)?,
        Zone::ZuluOrNumeric if zone == "Z" => 0,
        Zone::ZuluOrNumeric => numeric_offset(zone)?,
    };

    let naive = NaiveDateTime::parse_from_str(datetime, layout.datetime).ok()?;
    let offset = FixedOffset::east_opt(offset_secs)?;
    let ts = offset.from_local_datetime(&naive).single()?;

    tracing::trace!(layout = layout.name, raw = %raw, "Parsed publication date");
    Some(ts.with_timezone(&Utc))
}

/// `+hhmm` / `-hhmm` to seconds east of UTC
fn numeric_offset(zone: &str) -> Option<i32> {
    let bytes = zone.as_bytes();
    if bytes.len() != 5 || !bytes[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = zone[1..3].parse().ok()?;
    let minutes: i32 = zone[3..5].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

/// Zone abbreviation to seconds east of UTC.
///
/// The RFC 822 zones carry their fixed offsets; any other abbreviation is
/// accepted at UTC since its meaning depends on the publisher's locale.
fn named_offset(zone: &str) -> Option<i32> {
    if !(2..=5).contains(&zone.len()) || !zone.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let hours = match zone {
        "UT" | "UTC" | "GMT" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    };
    Some(hours * 3600)
}
