use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Complete,
    Failed,
    Cancelled,
    /// Anything else the processor reports, kept verbatim (upper-cased).
    Other(String),
}

impl PaymentStatus {
    /// Empty input reads as `PENDING`.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "" | "PENDING" => PaymentStatus::Pending,
            "COMPLETE" => PaymentStatus::Complete,
            "FAILED" => PaymentStatus::Failed,
            "CANCELLED" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Other(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Complete => "COMPLETE",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Other(s) => s,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Complete | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }

    /// Orders move once, from PENDING to a final status.
    pub fn can_move_to(&self, next: &PaymentStatus) -> bool {
        *self == PaymentStatus::Pending && next.is_final()
    }

    pub fn message(&self) -> String {
        match self {
            PaymentStatus::Complete => "Payment complete.".into(),
            PaymentStatus::Failed => "Payment failed.".into(),
            PaymentStatus::Cancelled => "Payment cancelled.".into(),
            other => format!("Payment status: {}.", other.as_str()),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the `orders` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub invoice_no: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub product: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_provider: String,
    pub payment_status: String,
    pub payfast_payment_id: Option<String>,
    pub payment_reference: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub payment_updated_at: Option<OffsetDateTime>,
    pub shipping_name: String,
    pub shipping_street: String,
    pub shipping_city: String,
    pub shipping_postal: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Order {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::parse(&self.payment_status)
    }
}

/// Insert payload; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub invoice_no: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub product: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_provider: String,
    pub shipping_name: String,
    pub shipping_street: String,
    pub shipping_city: String,
    pub shipping_postal: String,
}
