use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::repo_types::{NewOrder, Order, PaymentStatus};

const ORDER_COLUMNS: &str = r#"
    id, invoice_no, customer_name, customer_email, customer_phone, product, quantity,
    unit_price, subtotal_amount, shipping_amount, total_amount, payment_provider,
    payment_status, payfast_payment_id, payment_reference, payment_updated_at,
    shipping_name, shipping_street, shipping_city, shipping_postal, created_at
"#;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores the order as PENDING.
    async fn insert(&self, order: &NewOrder) -> anyhow::Result<Order>;
    async fn find_by_invoice(&self, invoice_no: &str) -> anyhow::Result<Option<Order>>;
    /// Applies `status` only while the order is still PENDING. Returns whether a row changed.
    async fn settle(
        &self,
        invoice_no: &str,
        status: &PaymentStatus,
        payfast_payment_id: Option<&str>,
    ) -> anyhow::Result<bool>;
}

pub struct PgOrderStore {
    db: PgPool,
}

impl PgOrderStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, o: &NewOrder) -> anyhow::Result<Order> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (
                invoice_no, customer_name, customer_email, customer_phone, product, quantity,
                unit_price, subtotal_amount, shipping_amount, total_amount, payment_provider,
                payment_status, shipping_name, shipping_street, shipping_city, shipping_postal
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'PENDING', $12, $13, $14, $15)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(&o.invoice_no)
        .bind(&o.customer_name)
        .bind(&o.customer_email)
        .bind(&o.customer_phone)
        .bind(&o.product)
        .bind(o.quantity)
        .bind(o.unit_price)
        .bind(o.subtotal_amount)
        .bind(o.shipping_amount)
        .bind(o.total_amount)
        .bind(&o.payment_provider)
        .bind(&o.shipping_name)
        .bind(&o.shipping_street)
        .bind(&o.shipping_city)
        .bind(&o.shipping_postal)
        .fetch_one(&self.db)
        .await
        .context("insert order")?;
        Ok(order)
    }

    async fn find_by_invoice(&self, invoice_no: &str) -> anyhow::Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE invoice_no = $1"
        ))
        .bind(invoice_no)
        .fetch_optional(&self.db)
        .await
        .context("select order")?;
        Ok(order)
    }

    async fn settle(
        &self,
        invoice_no: &str,
        status: &PaymentStatus,
        payfast_payment_id: Option<&str>,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2,
                payfast_payment_id = $3,
                payment_reference = $3,
                payment_updated_at = $4
            WHERE invoice_no = $1 AND payment_status = 'PENDING'
            "#,
        )
        .bind(invoice_no)
        .bind(status.as_str())
        .bind(payfast_payment_id)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.db)
        .await
        .context("update order status")?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;

    #[derive(Default)]
    pub struct MemoryOrderStore {
        pub rows: Mutex<Vec<Order>>,
        pub failing: bool,
    }

    impl MemoryOrderStore {
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl OrderStore for MemoryOrderStore {
        async fn insert(&self, o: &NewOrder) -> anyhow::Result<Order> {
            if self.failing {
                anyhow::bail!("relation \"orders\" does not exist");
            }
            let order = Order {
                id: Uuid::new_v4(),
                invoice_no: o.invoice_no.clone(),
                customer_name: o.customer_name.clone(),
                customer_email: o.customer_email.clone(),
                customer_phone: o.customer_phone.clone(),
                product: o.product.clone(),
                quantity: o.quantity,
                unit_price: o.unit_price,
                subtotal_amount: o.subtotal_amount,
                shipping_amount: o.shipping_amount,
                total_amount: o.total_amount,
                payment_provider: o.payment_provider.clone(),
                payment_status: PaymentStatus::Pending.to_string(),
                payfast_payment_id: None,
                payment_reference: None,
                payment_updated_at: None,
                shipping_name: o.shipping_name.clone(),
                shipping_street: o.shipping_street.clone(),
                shipping_city: o.shipping_city.clone(),
                shipping_postal: o.shipping_postal.clone(),
                created_at: OffsetDateTime::now_utc(),
            };
            self.rows.lock().await.push(order.clone());
            Ok(order)
        }

        async fn find_by_invoice(&self, invoice_no: &str) -> anyhow::Result<Option<Order>> {
            if self.failing {
                anyhow::bail!("connection refused");
            }
            let rows = self.rows.lock().await;
            Ok(rows.iter().find(|o| o.invoice_no == invoice_no).cloned())
        }

        async fn settle(
            &self,
            invoice_no: &str,
            status: &PaymentStatus,
            payfast_payment_id: Option<&str>,
        ) -> anyhow::Result<bool> {
            if self.failing {
                anyhow::bail!("connection refused");
            }
            let mut rows = self.rows.lock().await;
            let Some(order) = rows
                .iter_mut()
                .find(|o| o.invoice_no == invoice_no && o.status() == PaymentStatus::Pending)
            else {
                return Ok(false);
            };
            order.payment_status = status.to_string();
            order.payfast_payment_id = payfast_payment_id.map(str::to_string);
            order.payment_reference = payfast_payment_id.map(str::to_string);
            order.payment_updated_at = Some(OffsetDateTime::now_utc());
            Ok(true)
        }
    }
}
