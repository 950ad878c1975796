use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const NOT_AVAILABLE: &str = "Not available";
pub const NOT_MENTIONED: &str = "Not mentioned";
pub const NO_LOCATION: &str = "None";

/// `"<month> <day>[, <year>] - <month> <day>, <year>"`, searched anywhere in the text.
static PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+ \d{1,2})(?:, (\d{4}))? - (\w+ \d{1,2}, \d{4})").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Online,
    Offline,
}

/// One hackathon as it is stored in the `events` collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventListing {
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub mode: Mode,
    pub location: String,
    pub prize_money: String,
    pub apply_link: String,
}

/// Splits a submission period into `(start_date, end_date)`.
///
/// A start date without its own year borrows the year of the end date. Text
/// that does not look like a period is kept verbatim as the start date and
/// the end date becomes [`NOT_AVAILABLE`].
pub fn parse_period(text: &str) -> (String, String) {
    let Some(c) = PERIOD.captures(text) else {
        return (text.to_owned(), NOT_AVAILABLE.to_owned());
    };

    let end = &c[3];
    let year = match c.get(2) {
        Some(y) => y.as_str(),
        None => end.split_whitespace().next_back().unwrap_or_default(),
    };

    (format!("{}, {year}", &c[1]), end.to_owned())
}

/// Derives `(mode, location)` from the info block of a tile.
pub fn classify_location(info: &str) -> (Mode, String) {
    if info.to_lowercase().contains("online") {
        (Mode::Online, NO_LOCATION.to_owned())
    } else {
        (Mode::Offline, info.to_owned())
    }
}
