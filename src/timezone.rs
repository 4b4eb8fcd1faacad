//! # Timezone Abbreviation Lookup
//!
//! NOAA station metadata reports its timezone as an abbreviation (`EST`, `PST`,
//! `HST`, ...). This module maps such abbreviations to a DST-aware [`Tz`].
//!
//! The table is built once, on first use, from every zone chrono-tz knows about by
//! recording each zone's abbreviation on 2019-01-01. It is never mutated afterwards.
//! Abbreviations are ambiguous (`HST` is both Honolulu and Adak, `AST` both Puerto
//! Rico and Halifax). The abbreviations NOAA uses for US coastal stations are pinned
//! to the zone those stations actually sit in; any other collision resolves to the
//! zone enumerated last.

use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::{America, OffsetName, Pacific, Tz, TZ_VARIANTS};
use std::collections::HashMap;
use std::sync::OnceLock;

static ABBREVIATIONS: OnceLock<HashMap<String, Tz>> = OnceLock::new();

/// Zones NOAA stations report in, keyed by their January abbreviation.
const STATION_ZONES: [(&str, Tz); 9] = [
    ("EST", America::New_York),
    ("CST", America::Chicago),
    ("MST", America::Denver),
    ("PST", America::Los_Angeles),
    ("AKST", America::Anchorage),
    ("HST", Pacific::Honolulu),
    ("AST", America::Puerto_Rico),
    ("SST", Pacific::Pago_Pago),
    ("ChST", Pacific::Guam),
];

/// Resolve a timezone abbreviation. `None` means the caller should fall back to
/// naive local time.
pub fn resolve(abbreviation: &str) -> Option<Tz> {
    table().get(abbreviation.trim()).copied()
}

/// Force the table to be built, e.g. before any station is created.
pub fn init() {
    let _ = table();
}

fn table() -> &'static HashMap<String, Tz> {
    ABBREVIATIONS.get_or_init(build_table)
}

fn build_table() -> HashMap<String, Tz> {
    let mut table: HashMap<String, Tz> = HashMap::new();

    if let Some(winter) = reference_date() {
        for tz in TZ_VARIANTS.iter().copied() {
            if let Some(abbrev) = abbreviation_at(tz, winter) {
                table.insert(abbrev, tz);
            }
        }
    }

    for (abbrev, tz) in STATION_ZONES {
        table.insert(abbrev.to_string(), tz);
    }

    table
}

fn reference_date() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2019, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn abbreviation_at(tz: Tz, at: NaiveDateTime) -> Option<String> {
    tz.offset_from_utc_datetime(&at)
        .abbreviation()
        .map(str::to_owned)
}
