use rand::Rng;
use rust_decimal::Decimal;
use thiserror::Error;
use time::{macros::format_description, OffsetDateTime};
use tracing::{info, warn};

use super::{
    dto::{CheckoutForm, PayfastField, PayfastForm, ReturnQuery, ReturnView, ShippingDetails},
    pricing::{payfast_amount, quote, Product, Quote},
    repo::OrderStore,
    repo_types::{NewOrder, Order, PaymentStatus},
};
use crate::{auth::services::is_valid_email, config::PayfastConfig};

pub const PAYMENT_PROVIDER: &str = "payfast";
const PRIVATE_PAGE: &str = "residue-private.html";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Please complete: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("Complete shipping details before payment.")]
    ShippingIncomplete,
    #[error("Order backend is not configured.")]
    BackendMissing,
    #[error("Missing PayFast config (merchant id/key/notify url).")]
    PayfastConfigMissing,
    #[error("Could not create order: {0:#}")]
    Store(anyhow::Error),
}

/// Every unmet requirement, in form order. Empty means the form is complete.
pub fn missing_fields(form: &CheckoutForm) -> Vec<String> {
    let mut missing = Vec::new();
    if form.full_name.trim().is_empty() {
        missing.push("Full name".to_string());
    }
    let email = form.email.trim();
    if email.is_empty() {
        missing.push("Email".to_string());
    } else if !is_valid_email(email) {
        missing.push("Email (check the format)".to_string());
    }
    if form.phone.trim().is_empty() {
        missing.push("Phone".to_string());
    }
    if form.quantity <= 0 {
        missing.push("Quantity (must be greater than 0)".to_string());
    }
    if form.product().is_none() {
        missing.push("Select a product".to_string());
    }
    missing
}

/// Validated product and quantity, or the full list of problems.
pub fn checked_quote(form: &CheckoutForm, shipping: Decimal) -> Result<Quote, CheckoutError> {
    let missing = missing_fields(form);
    match form.product() {
        Some(product) if missing.is_empty() => Ok(quote(product, form.quantity, shipping)),
        _ => Err(CheckoutError::Missing(missing)),
    }
}

pub fn generate_invoice_no(now: OffsetDateTime) -> String {
    let stamp = now
        .to_offset(time::UtcOffset::UTC)
        .format(format_description!("[year][month][day][hour][minute][second]"))
        .unwrap_or_default();
    let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
    format!("INV-{stamp}-{suffix}")
}

/// First word, then the rest. A single word gets `.` as the last name.
pub fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    match parts.next() {
        None => (String::new(), String::new()),
        Some(first) => {
            let rest: Vec<&str> = parts.collect();
            let last = if rest.is_empty() {
                ".".to_string()
            } else {
                rest.join(" ")
            };
            (first.to_string(), last)
        }
    }
}

fn default_return_url(site_url: &str, payment: &str) -> String {
    format!("{site_url}/{PRIVATE_PAGE}?payment={payment}")
}

/// Hidden fields for the processor's hosted checkout form.
pub fn payfast_form(
    cfg: &PayfastConfig,
    site_url: &str,
    order: &Order,
) -> Result<PayfastForm, CheckoutError> {
    let (Some(merchant_id), Some(merchant_key), Some(notify_url)) =
        (&cfg.merchant_id, &cfg.merchant_key, &cfg.notify_url)
    else {
        return Err(CheckoutError::PayfastConfigMissing);
    };
    let return_url = cfg
        .return_url
        .clone()
        .unwrap_or_else(|| default_return_url(site_url, "success"));
    let cancel_url = cfg
        .cancel_url
        .clone()
        .unwrap_or_else(|| default_return_url(site_url, "cancelled"));
    let (name_first, name_last) = split_name(&order.customer_name);
    let product_name = Product::parse(&order.product)
        .map(Product::display_name)
        .unwrap_or("Premium Cards");

    let fields = vec![
        PayfastField::new("merchant_id", merchant_id),
        PayfastField::new("merchant_key", merchant_key),
        PayfastField::new("return_url", return_url),
        PayfastField::new("cancel_url", cancel_url),
        PayfastField::new("notify_url", notify_url),
        PayfastField::new("name_first", name_first),
        PayfastField::new("name_last", name_last),
        PayfastField::new("email_address", &order.customer_email),
        PayfastField::new("m_payment_id", &order.invoice_no),
        PayfastField::new("amount", payfast_amount(order.total_amount)),
        PayfastField::new("item_name", format!("{product_name} x {}", order.quantity)),
        PayfastField::new("item_description", format!("Residue order {}", order.invoice_no)),
        PayfastField::new("custom_str1", &order.invoice_no),
        PayfastField::new("custom_str2", &order.customer_email),
        PayfastField::new("custom_str3", &order.product),
        PayfastField::new("custom_str4", order.quantity.to_string()),
    ];

    Ok(PayfastForm {
        action: cfg.process_url.clone(),
        method: "POST",
        fields,
    })
}

pub fn new_order(form: &CheckoutForm, shipping: &ShippingDetails, q: &Quote, now: OffsetDateTime) -> NewOrder {
    NewOrder {
        invoice_no: generate_invoice_no(now),
        customer_name: form.full_name.trim().to_string(),
        customer_email: form.email.trim().to_lowercase(),
        customer_phone: form.phone.trim().to_string(),
        product: q.product.as_str().to_string(),
        quantity: q.quantity,
        unit_price: q.unit_price,
        subtotal_amount: q.subtotal,
        shipping_amount: q.shipping,
        total_amount: q.total,
        payment_provider: PAYMENT_PROVIDER.to_string(),
        shipping_name: shipping.name.trim().to_string(),
        shipping_street: shipping.street.trim().to_string(),
        shipping_city: shipping.city.trim().to_string(),
        shipping_postal: shipping.postal.trim().to_string(),
    }
}

/// Validates everything, then inserts the PENDING order and builds the redirect form.
pub async fn place_order(
    store: Option<&dyn OrderStore>,
    cfg: &PayfastConfig,
    site_url: &str,
    shipping_fee: Decimal,
    form: &CheckoutForm,
    shipping: &ShippingDetails,
) -> Result<(Order, PayfastForm), CheckoutError> {
    let q = checked_quote(form, shipping_fee)?;
    if !shipping.is_complete() {
        return Err(CheckoutError::ShippingIncomplete);
    }
    let store = store.ok_or(CheckoutError::BackendMissing)?;
    if cfg.merchant_id.is_none() || cfg.merchant_key.is_none() || cfg.notify_url.is_none() {
        return Err(CheckoutError::PayfastConfigMissing);
    }

    let order = store
        .insert(&new_order(form, shipping, &q, OffsetDateTime::now_utc()))
        .await
        .map_err(CheckoutError::Store)?;
    info!(invoice_no = %order.invoice_no, total = %order.total_amount, "order created");
    let form = payfast_form(cfg, site_url, &order)?;
    Ok((order, form))
}

/// Applies a processor return. Store failures are logged; the caller always gets a view.
/// Applies a final status to a PENDING order. The store's conditional update still
/// decides when two returns race.
async fn settle_if_pending(
    store: &dyn OrderStore,
    invoice: &str,
    status: &PaymentStatus,
    pf_payment_id: Option<&str>,
) -> bool {
    let current = match store.find_by_invoice(invoice).await {
        Ok(Some(order)) => order.status(),
        Ok(None) => {
            warn!(%invoice, "return for unknown invoice");
            return false;
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), %invoice, "order lookup failed");
            return false;
        }
    };
    if !current.can_move_to(status) {
        warn!(%invoice, %current, next = %status, "order already settled; status left as is");
        return false;
    }

    match store.settle(invoice, status, pf_payment_id).await {
        Ok(true) => true,
        Ok(false) => {
            warn!(%invoice, %status, "order settled concurrently; status left as is");
            false
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), %invoice, "order status update failed");
            false
        }
    }
}

pub async fn reconcile_return(store: Option<&dyn OrderStore>, query: &ReturnQuery) -> Option<ReturnView> {
    let invoice = query.m_payment_id.as_deref().map(str::trim).unwrap_or_default();
    let raw_status = query.payment_status.as_deref().unwrap_or_default();
    let pf_payment_id = query
        .pf_payment_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if invoice.is_empty() && raw_status.trim().is_empty() && pf_payment_id.is_none() {
        return None;
    }

    let status = PaymentStatus::parse(raw_status);
    let mut updated = false;
    match store {
        Some(store) if !invoice.is_empty() && status.is_final() => {
            updated = settle_if_pending(store, invoice, &status, pf_payment_id).await;
        }
        Some(_) => {}
        None => warn!(%invoice, "order backend not configured; return not recorded"),
    }

    Some(ReturnView {
        invoice_no: if invoice.is_empty() {
            "Unknown".to_string()
        } else {
            invoice.to_string()
        },
        payment_status: status.to_string(),
        message: status.message(),
        updated,
    })
}

#[cfg(test)]
mod tests {
    use regex::Regex;
    use time::macros::datetime;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::checkout::repo::memory::MemoryOrderStore;

    /// Counts how often the conditional update is attempted.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryOrderStore,
        settles: AtomicUsize,
    }

    #[async_trait]
    impl OrderStore for CountingStore {
        async fn insert(&self, order: &NewOrder) -> anyhow::Result<Order> {
            self.inner.insert(order).await
        }

        async fn find_by_invoice(&self, invoice_no: &str) -> anyhow::Result<Option<Order>> {
            self.inner.find_by_invoice(invoice_no).await
        }

        async fn settle(
            &self,
            invoice_no: &str,
            status: &PaymentStatus,
            payfast_payment_id: Option<&str>,
        ) -> anyhow::Result<bool> {
            self.settles.fetch_add(1, Ordering::SeqCst);
            self.inner.settle(invoice_no, status, payfast_payment_id).await
        }
    }

    fn form() -> CheckoutForm {
        CheckoutForm {
            full_name: "Ana Maria Silva".into(),
            email: "Ana@Example.com".into(),
            phone: "082 555 0101".into(),
            quantity: 2,
            product: Some("premium".into()),
        }
    }

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            name: "Ana Silva".into(),
            street: "1 Long St".into(),
            city: "Cape Town".into(),
            postal: "8001".into(),
        }
    }

    fn payfast() -> PayfastConfig {
        PayfastConfig {
            merchant_id: Some("10000100".into()),
            merchant_key: Some("46f0cd694581a".into()),
            notify_url: Some("https://residue.test/notify".into()),
            return_url: None,
            cancel_url: None,
            process_url: "https://sandbox.payfast.co.za/eng/process".into(),
        }
    }

    fn field<'a>(form: &'a PayfastForm, name: &str) -> &'a str {
        form.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
            .unwrap()
    }

    #[test]
    fn all_missing_fields_are_listed_at_once() {
        let empty = CheckoutForm::default();
        assert_eq!(
            missing_fields(&empty),
            vec![
                "Full name",
                "Email",
                "Phone",
                "Quantity (must be greater than 0)",
                "Select a product",
            ]
        );

        let mut bad = form();
        bad.email = "ana@".into();
        bad.product = Some("deluxe".into());
        assert_eq!(
            missing_fields(&bad),
            vec!["Email (check the format)", "Select a product"]
        );
        assert!(missing_fields(&form()).is_empty());
    }

    #[test]
    fn invoice_number_format() {
        let inv = generate_invoice_no(datetime!(2026-03-04 05:06:07 UTC));
        assert!(inv.starts_with("INV-20260304050607-"));
        assert!(Regex::new(r"^INV-\d{14}-\d{4}$").unwrap().is_match(&inv));
    }

    #[test]
    fn name_split() {
        assert_eq!(split_name("Cher"), ("Cher".into(), ".".into()));
        assert_eq!(
            split_name("  Ana  Maria Silva "),
            ("Ana".into(), "Maria Silva".into())
        );
        assert_eq!(split_name(""), (String::new(), String::new()));
    }

    #[tokio::test]
    async fn placing_an_order_builds_the_processor_form() {
        let store = MemoryOrderStore::default();
        let (order, pf) = place_order(
            Some(&store),
            &payfast(),
            "https://residue.test",
            Decimal::from(99),
            &form(),
            &shipping(),
        )
        .await
        .unwrap();

        assert_eq!(order.status(), PaymentStatus::Pending);
        assert_eq!(order.customer_email, "ana@example.com");
        assert_eq!(pf.action, "https://sandbox.payfast.co.za/eng/process");
        assert_eq!(field(&pf, "amount"), "1197.00");
        assert_eq!(field(&pf, "item_name"), "Premium Cards x 2");
        assert_eq!(field(&pf, "name_first"), "Ana");
        assert_eq!(field(&pf, "name_last"), "Maria Silva");
        assert_eq!(field(&pf, "m_payment_id"), order.invoice_no);
        assert_eq!(field(&pf, "custom_str4"), "2");
        assert_eq!(
            field(&pf, "return_url"),
            "https://residue.test/residue-private.html?payment=success"
        );
        assert_eq!(
            field(&pf, "item_description"),
            format!("Residue order {}", order.invoice_no)
        );
    }

    #[tokio::test]
    async fn order_rules_run_before_any_write() {
        let store = MemoryOrderStore::default();
        let mut no_ship = shipping();
        no_ship.city = " ".into();
        let err = place_order(Some(&store), &payfast(), "", Decimal::from(99), &form(), &no_ship)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ShippingIncomplete));

        let mut cfg = payfast();
        cfg.notify_url = None;
        let err = place_order(Some(&store), &cfg, "", Decimal::from(99), &form(), &shipping())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::PayfastConfigMissing));

        let err = place_order(None, &payfast(), "", Decimal::from(99), &form(), &shipping())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::BackendMissing));

        assert!(store.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn store_failure_surfaces_raw_text() {
        let store = MemoryOrderStore::failing();
        let err = place_order(Some(&store), &payfast(), "", Decimal::from(99), &form(), &shipping())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("relation \"orders\" does not exist"));
    }

    fn ret(invoice: Option<&str>, status: Option<&str>, pf: Option<&str>) -> ReturnQuery {
        ReturnQuery {
            m_payment_id: invoice.map(Into::into),
            payment_status: status.map(Into::into),
            pf_payment_id: pf.map(Into::into),
        }
    }

    #[tokio::test]
    async fn return_moves_pending_once() {
        let store = MemoryOrderStore::default();
        let (order, _) = place_order(
            Some(&store),
            &payfast(),
            "",
            Decimal::from(99),
            &form(),
            &shipping(),
        )
        .await
        .unwrap();

        let view = reconcile_return(
            Some(&store),
            &ret(Some(&order.invoice_no), Some("complete"), Some("pf-1")),
        )
        .await
        .unwrap();
        assert!(view.updated);
        assert_eq!(view.message, "Payment complete.");

        let stored = store.find_by_invoice(&order.invoice_no).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, "COMPLETE");
        assert_eq!(stored.payfast_payment_id.as_deref(), Some("pf-1"));

        let view = reconcile_return(
            Some(&store),
            &ret(Some(&order.invoice_no), Some("CANCELLED"), None),
        )
        .await
        .unwrap();
        assert!(!view.updated);
        let stored = store.find_by_invoice(&order.invoice_no).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, "COMPLETE");
    }

    #[tokio::test]
    async fn return_without_params_is_ignored_and_failures_are_quiet() {
        assert!(reconcile_return(None, &ret(None, None, None)).await.is_none());

        let view = reconcile_return(
            Some(&MemoryOrderStore::failing()),
            &ret(None, Some("failed"), None),
        )
        .await
        .unwrap();
        assert_eq!(view.invoice_no, "Unknown");
        assert_eq!(view.message, "Payment failed.");

        let view = reconcile_return(
            Some(&MemoryOrderStore::failing()),
            &ret(Some("INV-1"), Some("COMPLETE"), None),
        )
        .await
        .unwrap();
        assert!(!view.updated);
        assert_eq!(view.payment_status, "COMPLETE");
    }
    #[tokio::test]
    async fn settled_or_unknown_orders_are_not_updated_again() {
        let store = CountingStore::default();
        let (order, _) = place_order(
            Some(&store),
            &payfast(),
            "",
            Decimal::from(99),
            &form(),
            &shipping(),
        )
        .await
        .unwrap();

        let done = ret(Some(&order.invoice_no), Some("COMPLETE"), None);
        assert!(reconcile_return(Some(&store), &done).await.unwrap().updated);
        assert_eq!(store.settles.load(Ordering::SeqCst), 1);

        let late = ret(Some(&order.invoice_no), Some("FAILED"), None);
        assert!(!reconcile_return(Some(&store), &late).await.unwrap().updated);

        let stray = ret(Some("INV-20240101000000-0000"), Some("COMPLETE"), None);
        let view = reconcile_return(Some(&store), &stray).await.unwrap();
        assert!(!view.updated);
        assert_eq!(view.invoice_no, "INV-20240101000000-0000");

        assert_eq!(store.settles.load(Ordering::SeqCst), 1);
        let stored = store.find_by_invoice(&order.invoice_no).await.unwrap().unwrap();
        assert_eq!(stored.status(), PaymentStatus::Complete);
    }
}
