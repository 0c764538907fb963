use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{CheckoutForm, CheckoutProblem, OrderCreated, OrderRequest, QuoteResponse, ReturnQuery, ReturnView},
    services::{checked_quote, place_order, reconcile_return, CheckoutError, PAYMENT_PROVIDER},
};
use crate::{
    state::AppState,
    telemetry::{record_purchase, Outcome, PurchaseEvent},
};

type Rejection = (StatusCode, Json<CheckoutProblem>);

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout/quote", post(quote))
        .route("/checkout/orders", post(create_order))
        .route("/checkout/return", get(payment_return))
}

fn reject(err: CheckoutError) -> Rejection {
    let status = match &err {
        CheckoutError::Missing(_) | CheckoutError::ShippingIncomplete => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CheckoutError::BackendMissing | CheckoutError::PayfastConfigMissing => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CheckoutError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    let message = err.to_string();
    let missing = match err {
        CheckoutError::Missing(fields) => fields,
        _ => Vec::new(),
    };
    (status, Json(CheckoutProblem { message, missing }))
}

#[instrument(skip(state, form))]
pub async fn quote(
    State(state): State<AppState>,
    Json(form): Json<CheckoutForm>,
) -> Result<Json<QuoteResponse>, Rejection> {
    let quote = checked_quote(&form, state.config.shipping_fee).map_err(reject)?;
    Ok(Json(QuoteResponse {
        product_name: quote.product.display_name(),
        quote,
        shipping_name: form.full_name.trim().to_string(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<OrderRequest>,
) -> Result<Json<OrderCreated>, Rejection> {
    let cfg = &state.config;
    let placed = place_order(
        state.orders.as_deref(),
        &cfg.payfast,
        &cfg.site_url,
        cfg.shipping_fee,
        &payload.form,
        &payload.shipping,
    )
    .await;

    match placed {
        Ok((order, payfast)) => {
            let mut event = PurchaseEvent::new("order_created", Outcome::Success);
            event.email = Some(order.customer_email.clone());
            event.invoice_no = Some(order.invoice_no.clone());
            event.payment_provider = Some(PAYMENT_PROVIDER.into());
            event.payment_status = Some(order.payment_status.clone());
            event.amount_total = Some(order.total_amount);
            event.product = Some(order.product.clone());
            event.quantity = Some(order.quantity);
            record_purchase(state.activity.as_ref(), event).await;

            Ok(Json(OrderCreated {
                invoice_no: order.invoice_no,
                total: order.total_amount,
                payfast,
            }))
        }
        Err(err) => {
            match &err {
                CheckoutError::Store(e) => error!(error = %format!("{e:#}"), "order insert failed"),
                other => warn!(reason = %other, "order rejected"),
            }
            let mut event = PurchaseEvent::new("order_created", Outcome::Failure);
            event.email = Some(payload.form.email.trim().to_lowercase());
            event.product = payload.form.product().map(|p| p.as_str().to_string());
            event.quantity = Some(payload.form.quantity);
            event.detail = Some(err.to_string());
            record_purchase(state.activity.as_ref(), event).await;
            Err(reject(err))
        }
    }
}

#[instrument(skip(state))]
pub async fn payment_return(
    State(state): State<AppState>,
    Query(query): Query<ReturnQuery>,
) -> Result<Json<ReturnView>, (StatusCode, String)> {
    let view = reconcile_return(state.orders.as_deref(), &query)
        .await
        .ok_or((
            StatusCode::BAD_REQUEST,
            "No payment return parameters".to_string(),
        ))?;

    let mut event = PurchaseEvent::new(
        "payment_return",
        if view.updated {
            Outcome::Success
        } else {
            Outcome::Failure
        },
    );
    event.invoice_no = Some(view.invoice_no.clone());
    event.payment_provider = Some(PAYMENT_PROVIDER.into());
    event.payment_status = Some(view.payment_status.clone());
    record_purchase(state.activity.as_ref(), event).await;

    info!(invoice_no = %view.invoice_no, status = %view.payment_status, "payment return handled");
    Ok(Json(view))
}
