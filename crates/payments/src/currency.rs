//! Store currency and conversion to gateway minor units.

use common::Money;

/// ISO 4217 codes whose smallest unit is the whole unit.
const ZERO_DECIMAL_CODES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// The single currency the store sells in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    code: String,
    zero_decimal: bool,
}

impl Currency {
    /// Creates a currency with an explicit minor-unit rule.
    pub fn new(code: impl Into<String>, zero_decimal: bool) -> Self {
        Self {
            code: code.into().to_ascii_lowercase(),
            zero_decimal,
        }
    }

    /// Creates a currency, looking the minor-unit rule up by code.
    pub fn from_code(code: &str) -> Self {
        let zero_decimal = ZERO_DECIMAL_CODES
            .iter()
            .any(|known| known.eq_ignore_ascii_case(code));
        Self::new(code, zero_decimal)
    }

    /// Lowercase ISO code, as gateways expect it.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_zero_decimal(&self) -> bool {
        self.zero_decimal
    }

    /// Converts an amount to the gateway's integral minor units.
    ///
    /// Zero-decimal currencies are charged in whole units, rounding half up.
    pub fn to_minor_units(&self, amount: Money) -> i64 {
        if self.zero_decimal {
            (amount.cents() + 50).div_euclid(100)
        } else {
            amount.cents()
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::new("usd", false)
    }
}
