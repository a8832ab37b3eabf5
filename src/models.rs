// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Shared Domain Values
//!
//! Value types used across storage, gateways and the HTTP API.
//!
//! ## Money
//!
//! [`Money`] wraps a [`rust_decimal::Decimal`] held at currency precision
//! (two fractional digits). Share totals are computed as
//! `unit_price * unit_count` in decimal arithmetic, so no floating point
//! drift can enter a Share or Payment record. Every amount also fits in
//! `i64` minor units, which is what card providers are sent. On the wire
//! amounts are decimal strings with two fractional digits (`"5000.00"`).
//!
//! ## Payment Methods
//!
//! [`PaymentMethod`] is what a member picks when initiating a purchase. Each
//! method resolves to exactly one payment gateway.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::openapi::schema::{ObjectBuilder, Schema, Type};
use utoipa::openapi::RefOr;
use utoipa::ToSchema;

// =============================================================================
// Money
// =============================================================================

/// Currency precision in fractional digits.
const MONEY_SCALE: u32 = 2;

/// Errors produced while parsing or combining monetary amounts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("amount must be a valid decimal number")]
    Malformed,
    #[error("amount must have at most 2 decimal places")]
    TooPrecise,
    #[error("amount is too large")]
    Overflow,
}

/// Monetary amount at currency precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn from_minor(minor: i64) -> Self {
        Money(Decimal::new(minor, MONEY_SCALE))
    }

    /// Amount in minor units (cents).
    pub fn minor(self) -> i64 {
        // Construction guarantees the amount fits.
        self.0
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
            .unwrap_or(i64::MAX)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Multiply by a unit count, failing instead of overflowing.
    pub fn checked_mul(self, count: u32) -> Option<Money> {
        self.0
            .checked_mul(Decimal::from(count))
            .and_then(|total| Money::try_from(total).ok())
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0
            .checked_add(other.0)
            .and_then(|sum| Money::try_from(sum).ok())
    }

    /// Parse a decimal string such as `"50"`, `"50.5"` or `"50.00"`.
    ///
    /// A leading `-` is accepted so callers can reject non-positive amounts
    /// with their own error instead of a parse error.
    pub fn parse(raw: &str) -> Result<Money, MoneyError> {
        let amount = Decimal::from_str_exact(raw.trim()).map_err(|e| match e {
            rust_decimal::Error::ExceedsMaximumPossibleValue
            | rust_decimal::Error::LessThanMinimumPossibleValue => MoneyError::Overflow,
            _ => MoneyError::Malformed,
        })?;
        Money::try_from(amount)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    /// Rejects sub-cent precision and amounts beyond `i64` minor units.
    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        if amount.round_dp(MONEY_SCALE) != amount {
            return Err(MoneyError::TooPrecise);
        }
        let fits = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
            .is_some();
        if !fits {
            return Err(MoneyError::Overflow);
        }
        let mut amount = amount;
        amount.rescale(MONEY_SCALE);
        Ok(Money(amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts decimal strings and JSON numbers, as `Decimal` does.
impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::try_from(amount).map_err(serde::de::Error::custom)
    }
}

impl utoipa::PartialSchema for Money {
    fn schema() -> RefOr<Schema> {
        RefOr::T(Schema::Object(
            ObjectBuilder::new()
                .schema_type(Type::String)
                .description(Some("Decimal amount with two fractional digits, e.g. \"50.00\""))
                .build(),
        ))
    }
}

impl ToSchema for Money {}

// =============================================================================
// Payment Methods
// =============================================================================

/// Payment method chosen by the member when initiating a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card / QR checkout through Stripe.
    Card,
    /// Regional wallet checkout through MercadoPago.
    Wallet,
    /// International checkout through PayPal.
    Paypal,
    /// Bank transfer, verified by treasury staff.
    Transfer,
    /// Cash at the club office, verified by treasury staff.
    Cash,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Card,
        PaymentMethod::Wallet,
        PaymentMethod::Paypal,
        PaymentMethod::Transfer,
        PaymentMethod::Cash,
    ];

    /// Methods where no provider reports settlement; staff confirm by hand.
    pub fn requires_manual_confirmation(self) -> bool {
        matches!(self, PaymentMethod::Transfer | PaymentMethod::Cash)
    }

    /// Identifier of the gateway that serves this method.
    pub fn provider_id(self) -> &'static str {
        match self {
            PaymentMethod::Card => "stripe",
            PaymentMethod::Wallet => "mercadopago",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Transfer | PaymentMethod::Cash => "manual",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Cash => "cash",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<PaymentMethod> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" | "stripe" => Some(PaymentMethod::Card),
            "wallet" | "mercadopago" => Some(PaymentMethod::Wallet),
            "paypal" => Some(PaymentMethod::Paypal),
            "transfer" | "transferencia" => Some(PaymentMethod::Transfer),
            "cash" | "efectivo" => Some(PaymentMethod::Cash),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_currency_precision() {
        assert_eq!(Money::parse("25.5").unwrap(), Money::from_minor(2550));
        assert_eq!(Money::parse("50.00").unwrap(), Money::from_minor(5000));
        assert_eq!(Money::parse("7").unwrap(), Money::from_minor(700));
        assert_eq!(Money::parse("-1.25").unwrap(), Money::from_minor(-125));
        // Trailing zeros beyond the second digit do not add precision.
        assert_eq!(Money::parse("50.000").unwrap(), Money::from_minor(5000));
    }

    #[test]
    fn parse_rejects_garbage_and_extra_precision() {
        assert_eq!(Money::parse(""), Err(MoneyError::Malformed));
        assert_eq!(Money::parse("abc"), Err(MoneyError::Malformed));
        assert_eq!(Money::parse("1.2.3"), Err(MoneyError::Malformed));
        assert_eq!(Money::parse("1.234"), Err(MoneyError::TooPrecise));
        assert_eq!(
            Money::parse("999999999999999999999"),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn display_always_has_two_decimals() {
        assert_eq!(Money::from_minor(500_000).to_string(), "5000.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-150).to_string(), "-1.50");
        assert_eq!(Money::parse("7").unwrap().to_string(), "7.00");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn checked_mul_is_exact() {
        let price = Money::parse("50.00").unwrap();
        assert_eq!(price.checked_mul(100), Some(Money::from_minor(500_000)));
        assert_eq!(price.checked_mul(100).unwrap().minor(), 500_000);

        let odd = Money::parse("0.10").unwrap();
        assert_eq!(odd.checked_mul(3), Some(Money::from_minor(30)));

        assert_eq!(Money::from_minor(i64::MAX).checked_mul(2), None);
        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), None);
    }

    #[test]
    fn deserializes_from_string_and_number() {
        let from_text: Money = serde_json::from_str("\"50.00\"").unwrap();
        let from_int: Money = serde_json::from_str("50").unwrap();
        let from_number: Money = serde_json::from_str("50.1").unwrap();
        assert_eq!(from_text, Money::from_minor(5000));
        assert_eq!(from_int, Money::from_minor(5000));
        assert_eq!(from_number, Money::from_minor(5010));

        assert!(serde_json::from_str::<Money>("\"0.001\"").is_err());
        assert!(serde_json::from_str::<Money>("\"ten\"").is_err());
    }

    #[test]
    fn serializes_as_decimal_string() {
        let json = serde_json::to_string(&Money::from_minor(123_456)).unwrap();
        assert_eq!(json, "\"1234.56\"");
        let json = serde_json::to_string(&Money::parse("5").unwrap()).unwrap();
        assert_eq!(json, "\"5.00\"");
    }

    #[test]
    fn payment_method_resolves_provider() {
        assert_eq!(PaymentMethod::Card.provider_id(), "stripe");
        assert_eq!(PaymentMethod::Wallet.provider_id(), "mercadopago");
        assert_eq!(PaymentMethod::Paypal.provider_id(), "paypal");
        assert_eq!(PaymentMethod::Transfer.provider_id(), "manual");
        assert!(PaymentMethod::Cash.requires_manual_confirmation());
        assert!(!PaymentMethod::Card.requires_manual_confirmation());
    }

    #[test]
    fn payment_method_from_str_accepts_aliases() {
        assert_eq!(PaymentMethod::from_str("TRANSFER"), Some(PaymentMethod::Transfer));
        assert_eq!(PaymentMethod::from_str("efectivo"), Some(PaymentMethod::Cash));
        assert_eq!(PaymentMethod::from_str("bitcoin"), None);
    }
}
