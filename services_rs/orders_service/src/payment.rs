//! Mock payment references. Nothing here talks to a bank: the strings are
//! display values derived deterministically from order data.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Va,
    Transfer,
    Minimarket,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Va => "va",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Minimarket => "minimarket",
        }
    }

    /// Label stored in `orders.payment_method`.
    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Va => "VIRTUAL ACCOUNT",
            PaymentMethod::Transfer => "BANK TRANSFER",
            PaymentMethod::Minimarket => "MINIMARKET",
        }
    }

    pub fn default_channel(self) -> &'static str {
        match self {
            PaymentMethod::Va => "BCA",
            PaymentMethod::Transfer => "ATM BERSAMA",
            PaymentMethod::Minimarket => "Alfamart/Alfamidi",
        }
    }
}

/// Identifiers a reference can be derived from. The flight id wins over the
/// order code when both are present.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceSource<'a> {
    pub flight_id: Option<&'a str>,
    pub order_code: Option<&'a str>,
    pub amount: Option<i64>,
}

impl<'a> ReferenceSource<'a> {
    pub fn order(order_code: &'a str, amount: i64) -> Self {
        Self {
            flight_id: None,
            order_code: Some(order_code),
            amount: Some(amount),
        }
    }

    fn identifier(&self) -> &'a str {
        self.flight_id
            .filter(|s| !s.is_empty())
            .or(self.order_code)
            .unwrap_or("")
    }
}

fn va_prefix(bank: &str) -> &'static str {
    match bank.trim().to_ascii_uppercase().as_str() {
        "BRI" => "77777",
        "BNI" => "8808",
        _ => "3901",
    }
}

/// Last six digits of `id`, left-padded with zeros.
fn numeric_tail(id: &str) -> String {
    let digits: Vec<char> = id.chars().filter(char::is_ascii_digit).collect();
    let tail: String = digits[digits.len().saturating_sub(6)..].iter().collect();
    format!("{tail:0>6}")
}

fn minimarket_code(id: &str, amount: Option<i64>) -> String {
    let chars: Vec<char> = id.chars().collect();
    let head: String = chars[chars.len().saturating_sub(4)..]
        .iter()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let head = if head.is_empty() { "XXXX".to_string() } else { head };

    let amount_digits: String = amount
        .map(|a| a.to_string())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .take(3)
        .collect();
    format!("RF-{head}-{amount_digits:0>3}")
}

pub fn build_payment_reference(
    method: PaymentMethod,
    channel: &str,
    source: ReferenceSource<'_>,
) -> String {
    let id = source.identifier();
    match method {
        PaymentMethod::Va => format!("{}{}", va_prefix(channel), numeric_tail(id)),
        PaymentMethod::Transfer => format!("TRF{}", numeric_tail(id)),
        PaymentMethod::Minimarket => minimarket_code(id, source.amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn va_reference_uses_bank_prefix_and_code_tail() {
        let src = ReferenceSource {
            order_code: Some("ORD-25100007"),
            ..Default::default()
        };
        assert_eq!(
            build_payment_reference(PaymentMethod::Va, "BCA", src),
            "3901100007"
        );
        assert_eq!(
            build_payment_reference(PaymentMethod::Va, "bri", src),
            "77777100007"
        );
        assert_eq!(
            build_payment_reference(PaymentMethod::Va, "BNI", src),
            "8808100007"
        );
        assert_eq!(
            build_payment_reference(PaymentMethod::Va, "Mandiri", src),
            "3901100007"
        );
    }

    #[test]
    fn short_identifiers_are_zero_padded() {
        let src = ReferenceSource {
            flight_id: Some("GA210"),
            order_code: Some("ORD-25100007"),
            amount: None,
        };
        assert_eq!(
            build_payment_reference(PaymentMethod::Transfer, "ATM BERSAMA", src),
            "TRF000210"
        );
        assert_eq!(
            build_payment_reference(PaymentMethod::Transfer, "", ReferenceSource::default()),
            "TRF000000"
        );
    }

    #[test]
    fn minimarket_reference_mixes_code_and_amount() {
        let src = ReferenceSource::order("ORD-25100007", 1_350_000);
        assert_eq!(
            build_payment_reference(PaymentMethod::Minimarket, "Indomaret", src),
            "RF-0007-135"
        );

        let flight = ReferenceSource {
            flight_id: Some("qz-7"),
            amount: Some(42),
            ..Default::default()
        };
        assert_eq!(
            build_payment_reference(PaymentMethod::Minimarket, "Indomaret", flight),
            "RF-QZ7-042"
        );
        assert_eq!(
            build_payment_reference(
                PaymentMethod::Minimarket,
                "Indomaret",
                ReferenceSource::default()
            ),
            "RF-XXXX-000"
        );
    }

    #[test]
    fn method_labels_and_default_channels() {
        assert_eq!(PaymentMethod::Va.label(), "VIRTUAL ACCOUNT");
        assert_eq!(PaymentMethod::Transfer.default_channel(), "ATM BERSAMA");
        let parsed: PaymentMethod = serde_json::from_str("\"minimarket\"").unwrap();
        assert_eq!(parsed, PaymentMethod::Minimarket);
    }
}
