use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::pricing::{Product, Quote};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub product: Option<String>,
}

impl CheckoutForm {
    pub fn product(&self) -> Option<Product> {
        self.product.as_deref().and_then(Product::parse)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal: String,
}

impl ShippingDetails {
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.street, &self.city, &self.postal]
            .iter()
            .all(|f| !f.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    #[serde(flatten)]
    pub form: CheckoutForm,
    #[serde(default)]
    pub shipping: ShippingDetails,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub quote: Quote,
    pub product_name: &'static str,
    /// Pre-fills the shipping name with the buyer's full name.
    pub shipping_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayfastField {
    pub name: &'static str,
    pub value: String,
}

impl PayfastField {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Auto-submitted by the client to hand the buyer over to the processor.
#[derive(Debug, Clone, Serialize)]
pub struct PayfastForm {
    pub action: String,
    pub method: &'static str,
    pub fields: Vec<PayfastField>,
}

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub invoice_no: String,
    pub total: Decimal,
    pub payfast: PayfastForm,
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    pub m_payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub pf_payment_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReturnView {
    pub invoice_no: String,
    pub payment_status: String,
    pub message: String,
    pub updated: bool,
}

/// Checkout rejections carry the full list of problems, not just the first.
#[derive(Debug, Serialize)]
pub struct CheckoutProblem {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}
