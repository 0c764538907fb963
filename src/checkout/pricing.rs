use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Premium,
    Standard,
}

impl Product {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "premium" => Some(Product::Premium),
            "standard" => Some(Product::Standard),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Product::Premium => "premium",
            Product::Standard => "standard",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Product::Premium => "Premium Cards",
            Product::Standard => "Standard Cards",
        }
    }

    /// Rand per card for (1, 2..=4, 5+) cards.
    fn tiers(self) -> [i64; 3] {
        match self {
            Product::Premium => [599, 549, 499],
            Product::Standard => [399, 349, 299],
        }
    }
}

pub fn unit_price(product: Product, quantity: i32) -> Decimal {
    let [single, pair, bulk] = product.tiers();
    let rand = if quantity >= 5 {
        bulk
    } else if quantity >= 2 {
        pair
    } else {
        single
    };
    Decimal::from(rand)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub product: Product,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

pub fn quote(product: Product, quantity: i32, shipping: Decimal) -> Quote {
    let unit_price = unit_price(product, quantity);
    let subtotal = unit_price * Decimal::from(quantity);
    Quote {
        product,
        quantity,
        unit_price,
        subtotal,
        shipping,
        total: subtotal + shipping,
    }
}

/// Two decimal places, no thousands separator: `1296.00`.
pub fn payfast_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}
