use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt::{self, Formatter},
    str::FromStr,
};

/// a UTC calendar day
///
/// dead-drop slots are bucketed per day: the sender and the recipient
/// only need to agree on the date (in UTC) to derive the same storage key.
/// The string representation is fixed (`YYYY-MM-DD`) and sorts in
/// chronological order, which also makes it usable as a file name.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// the current UTC day
    pub fn today() -> Self {
        Self(Utc::now().naive_utc().date())
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    /// the day `days` before this one (or after if negative)
    pub fn days_before(self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    /// the lookback window ending at (and including) `self`, oldest first
    ///
    /// ```
    /// # use dropmail_lib::DayKey;
    /// let today: DayKey = "2024-06-15".parse().unwrap();
    /// let window: Vec<String> = today.window(3).map(|d| d.to_string()).collect();
    /// assert_eq!(window, vec!["2024-06-13", "2024-06-14", "2024-06-15"]);
    /// ```
    pub fn window(self, days: u32) -> impl Iterator<Item = DayKey> {
        let days = i64::from(days);
        (0..days).rev().map(move |offset| self.days_before(offset))
    }

    /// the oldest day still within a window of `days` ending at `self`
    ///
    /// anything strictly before this day is outside the window.
    pub fn window_start(self, days: u32) -> Self {
        self.days_before(i64::from(days.max(1)) - 1)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl fmt::Debug for DayKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DayKey").field(&self.to_string()).finish()
    }
}

impl FromStr for DayKey {
    type Err = chrono::ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, Self::FORMAT).map(Self)
    }
}

impl From<DayKey> for String {
    fn from(day: DayKey) -> Self {
        day.to_string()
    }
}

impl TryFrom<String> for DayKey {
    type Error = chrono::ParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
