//! Identifier text layout: `PREFIX + YYYYMMDD + zero-padded tail`.
//!
//! The layout is an external contract. Consumers slice identifiers by fixed
//! width (prefix length, eight date digits, `number_length` tail digits), so
//! formatting never truncates or widens silently.

use core::fmt;

use crate::{DateKey, Error, GenerationConfig, Result};

/// A formatted business document number such as `SO202501190001`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Number of decimal digits needed to print `value`.
const fn decimal_digits(mut value: u64) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

/// Combines a prefix, a date key and a zero-padded sequence value.
///
/// # Errors
///
/// Returns [`Error::FormatOverflow`] if `sequence` needs more than
/// `number_length` digits.
///
/// # Example
///
/// ```
/// use docseq::{DateKey, format_identifier};
///
/// let day = DateKey::from_ymd(2025, 1, 19).unwrap();
/// let id = format_identifier("SO", day, 1, 4).unwrap();
/// assert_eq!(id.as_str(), "SO202501190001");
/// assert!(format_identifier("SO", day, 10_000, 4).is_err());
/// ```
pub fn format_identifier(
    prefix: &str,
    date_key: DateKey,
    sequence: u64,
    number_length: usize,
) -> Result<Identifier> {
    if decimal_digits(sequence) > number_length {
        return Err(Error::FormatOverflow {
            value: sequence,
            width: number_length,
        });
    }
    Ok(Identifier(format!(
        "{prefix}{date_key}{sequence:0>width$}",
        width = number_length
    )))
}

/// The three components recovered from an identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub prefix: String,
    pub date_key: DateKey,
    pub sequence: u64,
}

/// Splits an identifier by fixed-width slicing.
///
/// # Errors
///
/// Returns [`Error::MalformedIdentifier`] if the length does not equal
/// `prefix_len + 8 + number_length`, the prefix is not alphabetic, the date
/// is not a calendar day, or the tail is not all digits.
pub fn parse_identifier(
    text: &str,
    prefix_len: usize,
    number_length: usize,
) -> Result<ParsedIdentifier> {
    let malformed = |reason: String| Error::MalformedIdentifier {
        identifier: text.to_string(),
        reason,
    };

    let expected = prefix_len + DateKey::LEN + number_length;
    if !text.is_ascii() || text.len() != expected {
        return Err(malformed(format!(
            "expected {expected} ASCII characters, got {}",
            text.len()
        )));
    }

    let (prefix, rest) = text.split_at(prefix_len);
    let (date, tail) = rest.split_at(DateKey::LEN);

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(malformed(format!("prefix {prefix:?} is not alphabetic")));
    }
    let date_key = date
        .parse::<DateKey>()
        .map_err(|_| malformed(format!("{date:?} is not a YYYYMMDD date")))?;
    if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(format!("tail {tail:?} is not numeric")));
    }
    let sequence = tail
        .parse::<u64>()
        .map_err(|e| malformed(format!("tail {tail:?}: {e}")))?;

    Ok(ParsedIdentifier {
        prefix: prefix.to_string(),
        date_key,
        sequence,
    })
}

impl GenerationConfig {
    /// Formats `sequence` for `date_key` with this config's prefix and width.
    ///
    /// # Errors
    ///
    /// See [`format_identifier`].
    pub fn format(&self, date_key: DateKey, sequence: u64) -> Result<Identifier> {
        format_identifier(self.prefix(), date_key, sequence, self.number_length())
    }

    /// Parses an identifier produced with this config, also checking the
    /// prefix matches.
    ///
    /// # Errors
    ///
    /// See [`parse_identifier`].
    pub fn parse(&self, text: &str) -> Result<ParsedIdentifier> {
        let parsed = parse_identifier(text, self.prefix().len(), self.number_length())?;
        if parsed.prefix != self.prefix() {
            return Err(Error::MalformedIdentifier {
                identifier: text.to_string(),
                reason: format!("prefix {:?} is not {:?}", parsed.prefix, self.prefix()),
            });
        }
        Ok(parsed)
    }
}
