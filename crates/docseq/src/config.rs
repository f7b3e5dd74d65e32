use core::{fmt, str::FromStr};

use crate::{Error, Result};

/// Default digit width of the zero-padded sequence tail.
pub const DEFAULT_NUMBER_LENGTH: usize = 4;

/// Widest supported tail. Any `u64` counter that fits is representable.
pub const MAX_NUMBER_LENGTH: usize = 18;

/// Longest accepted prefix.
pub const MAX_PREFIX_LENGTH: usize = 8;

/// Longest accepted sequence type name.
pub const MAX_SEQUENCE_TYPE_LENGTH: usize = 64;

/// Immutable per-call settings for one kind of business document.
///
/// - `prefix`: short ASCII alphabetic code, e.g. `"SO"`.
/// - `number_length`: digit width of the zero-padded tail.
/// - `sequence_type`: counter namespace, e.g. `"sales_order"`.
///
/// Changing `number_length` for a live sequence type is a breaking change to
/// the identifier contract: downstream consumers slice identifiers by fixed
/// width.
///
/// ```
/// use docseq::GenerationConfig;
///
/// let config = GenerationConfig::new("SO", 4, "sales_order").unwrap();
/// assert_eq!(config, GenerationConfig::sales_order());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GenerationConfig {
    prefix: String,
    number_length: usize,
    sequence_type: String,
}

impl GenerationConfig {
    /// Validates and builds a config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the prefix is not 1 to
    /// [`MAX_PREFIX_LENGTH`] ASCII letters, the width is outside
    /// `1..=`[`MAX_NUMBER_LENGTH`], or the sequence type is not a non-empty
    /// run of lowercase ASCII letters, digits and underscores.
    pub fn new(
        prefix: impl Into<String>,
        number_length: usize,
        sequence_type: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.into();
        let sequence_type = sequence_type.into();

        if prefix.is_empty()
            || prefix.len() > MAX_PREFIX_LENGTH
            || !prefix.bytes().all(|b| b.is_ascii_alphabetic())
        {
            return Err(invalid(format!(
                "prefix {prefix:?} must be 1..={MAX_PREFIX_LENGTH} ASCII letters"
            )));
        }
        if !(1..=MAX_NUMBER_LENGTH).contains(&number_length) {
            return Err(invalid(format!(
                "number length {number_length} must be within 1..={MAX_NUMBER_LENGTH}"
            )));
        }
        if !is_sequence_type(&sequence_type) {
            return Err(invalid(format!(
                "sequence type {sequence_type:?} must be 1..={MAX_SEQUENCE_TYPE_LENGTH} of [a-z0-9_]"
            )));
        }

        Ok(Self {
            prefix,
            number_length,
            sequence_type,
        })
    }

    /// `SO` / 4 digits / `sales_order`.
    pub fn sales_order() -> Self {
        Domain::SalesOrder.default_config()
    }

    /// `PO` / 4 digits / `purchase_order`.
    pub fn purchase_order() -> Self {
        Domain::PurchaseOrder.default_config()
    }

    /// `RO` / 4 digits / `return_order`.
    pub fn return_order() -> Self {
        Domain::ReturnOrder.default_config()
    }

    /// `FS` / `number_length` digits / `factory_shipment`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a width outside
    /// `1..=`[`MAX_NUMBER_LENGTH`].
    pub fn factory_shipment(number_length: usize) -> Result<Self> {
        Domain::FactoryShipment.config(number_length)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub const fn number_length(&self) -> usize {
        self.number_length
    }

    pub fn sequence_type(&self) -> &str {
        &self.sequence_type
    }

    /// Total length of every identifier produced with this config.
    pub fn identifier_len(&self) -> usize {
        self.prefix.len() + crate::DateKey::LEN + self.number_length
    }
}

fn invalid(reason: String) -> Error {
    Error::InvalidConfig { reason }
}

/// Returns `true` for names accepted as a counter namespace.
pub fn is_sequence_type(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_SEQUENCE_TYPE_LENGTH
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// The business document kinds with a built-in numbering scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Domain {
    SalesOrder,
    PurchaseOrder,
    ReturnOrder,
    FactoryShipment,
}

impl Domain {
    pub const ALL: [Self; 4] = [
        Self::SalesOrder,
        Self::PurchaseOrder,
        Self::ReturnOrder,
        Self::FactoryShipment,
    ];

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::SalesOrder => "SO",
            Self::PurchaseOrder => "PO",
            Self::ReturnOrder => "RO",
            Self::FactoryShipment => "FS",
        }
    }

    pub const fn sequence_type(self) -> &'static str {
        match self {
            Self::SalesOrder => "sales_order",
            Self::PurchaseOrder => "purchase_order",
            Self::ReturnOrder => "return_order",
            Self::FactoryShipment => "factory_shipment",
        }
    }

    /// The domain's config with the default tail width.
    pub fn default_config(self) -> GenerationConfig {
        GenerationConfig {
            prefix: self.prefix().to_string(),
            number_length: DEFAULT_NUMBER_LENGTH,
            sequence_type: self.sequence_type().to_string(),
        }
    }

    /// The domain's config with an explicit tail width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a width outside
    /// `1..=`[`MAX_NUMBER_LENGTH`].
    pub fn config(self, number_length: usize) -> Result<GenerationConfig> {
        GenerationConfig::new(self.prefix(), number_length, self.sequence_type())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sequence_type())
    }
}

impl FromStr for Domain {
    type Err = Error;

    /// Accepts either the sequence type (`sales_order`) or the prefix (`SO`),
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| {
                d.sequence_type().eq_ignore_ascii_case(s) || d.prefix().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| invalid(format!("unknown domain {s:?}")))
    }
}
