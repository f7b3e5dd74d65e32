use core::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate, Utc};

use crate::Error;

/// A calendar day rendered as an 8-digit `YYYYMMDD` string.
///
/// The date key is both half of a counter's compound key and a literal
/// substring of every identifier issued on that day. Only years `1..=9999`
/// are representable so the rendering is always exactly eight digits.
///
/// ```
/// use docseq::DateKey;
///
/// let day = DateKey::from_ymd(2025, 1, 19).unwrap();
/// assert_eq!(day.to_string(), "20250119");
/// assert_eq!("20250119".parse::<DateKey>().unwrap(), day);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// Number of characters in a rendered date key.
    pub const LEN: usize = 8;

    /// Builds a date key from calendar components, or `None` if the date is
    /// invalid or outside `0001-01-01..=9999-12-31`.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).and_then(Self::from_date)
    }

    /// Wraps a [`NaiveDate`], or `None` if its year has no 4-digit rendering.
    pub fn from_date(date: NaiveDate) -> Option<Self> {
        (1..=9999).contains(&date.year()).then_some(Self(date))
    }

    /// The underlying calendar date.
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    /// The following calendar day, if representable.
    pub fn succ(self) -> Option<Self> {
        self.0.succ_opt().and_then(Self::from_date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

impl FromStr for DateKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| Error::MalformedIdentifier {
            identifier: s.to_string(),
            reason: reason.to_string(),
        };
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("date key must be exactly 8 ASCII digits"));
        }
        // All-digit input of fixed width, so these slices and parses hold.
        let year: i32 = s[0..4].parse().map_err(|_| malformed("bad year"))?;
        let month: u32 = s[4..6].parse().map_err(|_| malformed("bad month"))?;
        let day: u32 = s[6..8].parse().map_err(|_| malformed("bad day"))?;
        Self::from_ymd(year, month, day).ok_or_else(|| malformed("not a calendar date"))
    }
}

impl TryFrom<String> for DateKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}

/// A source of "today" for counter keys.
///
/// Generation consults the source once per attempt, so a retry that crosses
/// midnight lands on the new day's counter.
///
/// ```
/// use docseq::{DateKey, DateSource, FixedDate};
///
/// let day = DateKey::from_ymd(2025, 1, 19).unwrap();
/// assert_eq!(FixedDate::new(day).today(), day);
/// ```
pub trait DateSource {
    /// Returns the current date key.
    fn today(&self) -> DateKey;
}

/// Wall-clock UTC date, no time component.
#[derive(Clone, Copy, Debug, Default)]
pub struct UtcDate;

impl DateSource for UtcDate {
    fn today(&self) -> DateKey {
        // The wall clock is always inside 0001..=9999.
        DateKey(Utc::now().date_naive())
    }
}

/// A date source pinned to a single day. Useful for tests and backfills.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedDate(DateKey);

impl FixedDate {
    pub const fn new(day: DateKey) -> Self {
        Self(day)
    }
}

impl DateSource for FixedDate {
    fn today(&self) -> DateKey {
        self.0
    }
}

impl<D: DateSource + ?Sized> DateSource for &D {
    fn today(&self) -> DateKey {
        (**self).today()
    }
}

impl<D: DateSource + ?Sized> DateSource for std::sync::Arc<D> {
    fn today(&self) -> DateKey {
        (**self).today()
    }
}
