//! Minor-unit money.
//!
//! Orders store amounts as integer minor units (centavos). Providers
//! disagree about units on the wire: MercadoPago and Asaas want decimal
//! currency units, PushinPay wants cents. The conversions live here so
//! adapters never do arithmetic on raw integers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settlement currencies this system handles (ISO 4217).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    BRL,
    USD,
    EUR,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BRL => "BRL",
            Self::USD => "USD",
            Self::EUR => "EUR",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::BRL => "R$",
            Self::USD => "$",
            Self::EUR => "€",
        }
    }

    /// All supported currencies use two decimal places.
    pub fn decimals(&self) -> u32 {
        2
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "BRL" => Some(Self::BRL),
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Amount in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Minor units (centavos, cents).
    pub amount: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// BRL amount from centavos.
    pub fn brl(centavos: i64) -> Self {
        Self::new(centavos, Currency::BRL)
    }

    /// Decimal currency units, e.g. `9900` centavos → `99.00`.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from(self.amount) / Decimal::from(10i64.pow(self.currency.decimals()))
    }

    /// Build from decimal units, rounding to the nearest minor unit.
    pub fn from_decimal(amount: Decimal, currency: Currency) -> Self {
        let scaled = (amount * Decimal::from(10i64.pow(currency.decimals()))).round();
        Self {
            amount: scaled.try_into().unwrap_or(0),
            currency,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    pub fn format(&self) -> String {
        format!(
            "{}{:.prec$}",
            self.currency.symbol(),
            self.to_decimal(),
            prec = self.currency.decimals() as usize
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_brl_from_centavos() {
        let money = Money::brl(9900);
        assert_eq!(money.amount, 9900);
        assert_eq!(money.currency, Currency::BRL);
        assert!(money.is_positive());
    }

    #[test]
    fn test_decimal_round_trip() {
        let money = Money::brl(12345);
        assert_eq!(money.to_decimal(), Decimal::new(12345, 2));

        let back = Money::from_decimal(Decimal::new(12345, 2), Currency::BRL);
        assert_eq!(back, money);
    }

    #[test]
    fn test_from_decimal_rounds() {
        let money = Money::from_decimal(Decimal::new(99999, 3), Currency::BRL); // 99.999
        assert_eq!(money.amount, 10000);
    }

    #[test]
    fn test_format() {
        assert_eq!(Money::brl(9900).format(), "R$99.00");
        assert_eq!(Money::new(150, Currency::USD).format(), "$1.50");
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::from_code("brl"), Some(Currency::BRL));
        assert_eq!(Currency::from_code("XYZ"), None);
        assert_eq!(Currency::default(), Currency::BRL);
    }
}
