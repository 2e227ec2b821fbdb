//! HTTP surface.
//!
//! Thin handlers over the workflow layer. Order submission and shipment
//! fulfillment are batch endpoints: each element gets its own per-item
//! status so one bad document never sinks the rest of the batch.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::catalog;
use crate::config::AppConfig;
use crate::erp::bridge::{BridgeSession, ConnectionProfile};
use crate::erp::GatewayContext;
use crate::error::{GatewayError, Result};
use crate::store::SqlStore;
use crate::workflow::orders::{CancelPayload, OrderPayload, QuotationPayload};
use crate::workflow::partners::{ContactPayload, CustomerPayload};
use crate::workflow::shipments::ShipmentPayload;
use crate::workflow::{orders, partners, shipments};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: PgPool,
    pub nats: async_nats::Client,
}

impl AppState {
    /// Builds the collaborator pair for one request. Both handles are
    /// cheap clones over shared connections.
    fn context(&self) -> GatewayContext {
        GatewayContext::new(
            Box::new(BridgeSession::new(
                self.nats.clone(),
                self.config.erp_subject_prefix.clone(),
                ConnectionProfile {
                    company_db: self.config.company_db.clone(),
                    license_server: self.config.license_server.clone(),
                    locale: self.config.locale.clone(),
                    use_trusted: self.config.use_trusted,
                },
            )),
            Box::new(SqlStore::new(self.db.clone())),
        )
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/info", get(company_info))
        .route("/codes", get(codes))
        .route("/orders", get(list_orders).post(submit_orders))
        .route("/orders/cancel", post(cancel_orders))
        .route("/quotations", post(submit_quotations))
        .route("/customers", post(create_customer))
        .route("/customers/:card_code", put(update_customer))
        .route("/contacts", get(list_contacts).post(create_contact))
        .route("/shipments", get(list_shipments).post(submit_shipments))
        .route("/items", get(list_items))
        .route("/prices", get(list_prices))
        .route("/stock", get(list_stock))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .nest(
            "/api/v1",
            Router::new().route("/login", post(auth::login)).merge(protected),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Per-element outcome of a batch submission. `S` succeeded, `F` failed,
/// `X` cancelled; failures carry the reason in `tx_note`.
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub web_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    pub tx_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_note: Option<String>,
}

impl BatchOutcome {
    fn ok(web_order_id: &str, status: &'static str, doc_entry: i64) -> Self {
        Self {
            web_order_id: web_order_id.to_string(),
            order_id: Some(doc_entry),
            tx_status: status,
            tx_note: None,
        }
    }

    fn failed(web_order_id: &str, err: GatewayError) -> Self {
        Self {
            web_order_id: web_order_id.to_string(),
            order_id: None,
            tx_status: "F",
            tx_note: Some(err.to_string()),
        }
    }
}

async fn submit_orders(
    State(state): State<AppState>,
    Json(batch): Json<Vec<OrderPayload>>,
) -> Result<Json<Vec<BatchOutcome>>> {
    let ctx = state.context();
    let mut outcomes = Vec::with_capacity(batch.len());
    for payload in &batch {
        let outcome = match orders::submit_order(&ctx, &state.config, payload).await {
            Ok(doc_entry) => BatchOutcome::ok(&payload.web_order_id, "S", doc_entry),
            Err(err) => {
                tracing::warn!(web_order_id = %payload.web_order_id, %err, "order rejected");
                BatchOutcome::failed(&payload.web_order_id, err)
            }
        };
        outcomes.push(outcome);
    }
    Ok(Json(outcomes))
}

async fn cancel_orders(
    State(state): State<AppState>,
    Json(batch): Json<Vec<CancelPayload>>,
) -> Result<Json<Vec<BatchOutcome>>> {
    let ctx = state.context();
    let mut outcomes = Vec::with_capacity(batch.len());
    for payload in &batch {
        let outcome = match orders::cancel_order(&ctx, payload).await {
            Ok(doc_entry) => BatchOutcome::ok(&payload.web_order_id, "X", doc_entry),
            Err(err) => {
                tracing::warn!(web_order_id = %payload.web_order_id, %err, "cancel failed");
                BatchOutcome::failed(&payload.web_order_id, err)
            }
        };
        outcomes.push(outcome);
    }
    Ok(Json(outcomes))
}

async fn submit_quotations(
    State(state): State<AppState>,
    Json(batch): Json<Vec<QuotationPayload>>,
) -> Result<Json<Vec<BatchOutcome>>> {
    let ctx = state.context();
    let mut outcomes = Vec::with_capacity(batch.len());
    for payload in &batch {
        let outcome = match orders::submit_quotation(&ctx, payload).await {
            Ok(doc_entry) => BatchOutcome::ok(&payload.web_order_id, "S", doc_entry),
            Err(err) => {
                tracing::warn!(web_order_id = %payload.web_order_id, %err, "quotation rejected");
                BatchOutcome::failed(&payload.web_order_id, err)
            }
        };
        outcomes.push(outcome);
    }
    Ok(Json(outcomes))
}

async fn submit_shipments(
    State(state): State<AppState>,
    Json(batch): Json<Vec<ShipmentPayload>>,
) -> Result<Json<Vec<BatchOutcome>>> {
    let ctx = state.context();
    let mut outcomes = Vec::with_capacity(batch.len());
    for payload in &batch {
        let outcome = match shipments::fulfill_shipment(&ctx, payload).await {
            Ok(doc_entry) => BatchOutcome::ok(&payload.web_order_id, "S", doc_entry),
            Err(err) => {
                tracing::warn!(web_order_id = %payload.web_order_id, %err, "fulfillment failed");
                BatchOutcome::failed(&payload.web_order_id, err)
            }
        };
        outcomes.push(outcome);
    }
    Ok(Json(outcomes))
}

#[derive(Debug, Serialize)]
struct CustomerCreated {
    card_code: String,
}

async fn create_customer(
    State(state): State<AppState>,
    Json(payload): Json<CustomerPayload>,
) -> Result<(StatusCode, Json<CustomerCreated>)> {
    let ctx = state.context();
    let card_code = partners::insert_customer(&ctx, &state.config, &payload).await?;
    Ok((StatusCode::CREATED, Json(CustomerCreated { card_code })))
}

async fn update_customer(
    State(state): State<AppState>,
    Path(card_code): Path<String>,
    Json(payload): Json<CustomerPayload>,
) -> Result<StatusCode> {
    let ctx = state.context();
    partners::update_customer(&ctx, &card_code, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ContactRequest {
    card_code: String,
    #[serde(flatten)]
    contact: ContactPayload,
}

#[derive(Debug, Serialize)]
struct ContactCreated {
    contact_code: i64,
}

async fn create_contact(
    State(state): State<AppState>,
    Json(req): Json<ContactRequest>,
) -> Result<(StatusCode, Json<ContactCreated>)> {
    let ctx = state.context();
    let contact_code = partners::insert_contact(&ctx, &req.card_code, &req.contact).await?;
    Ok((StatusCode::CREATED, Json(ContactCreated { contact_code })))
}

async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<catalog::OrderFilter>,
) -> Result<Json<serde_json::Value>> {
    let ctx = state.context();
    let rows = catalog::orders(ctx.store.as_ref(), &filter).await?;
    Ok(Json(serde_json::json!({ "data": rows })))
}

async fn list_contacts(
    State(state): State<AppState>,
    Query(filter): Query<catalog::ContactFilter>,
) -> Result<Json<serde_json::Value>> {
    let ctx = state.context();
    let rows = catalog::contacts(ctx.store.as_ref(), &filter).await?;
    Ok(Json(serde_json::json!({ "data": rows })))
}

async fn list_shipments(
    State(state): State<AppState>,
    Query(filter): Query<catalog::ShipmentFilter>,
) -> Result<Json<serde_json::Value>> {
    let ctx = state.context();
    let rows = catalog::shipments(ctx.store.as_ref(), &filter).await?;
    Ok(Json(serde_json::json!({ "data": rows })))
}

async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<catalog::ItemFilter>,
) -> Result<Json<serde_json::Value>> {
    let ctx = state.context();
    let rows = catalog::items(ctx.store.as_ref(), &filter).await?;
    Ok(Json(serde_json::json!({ "data": rows })))
}

async fn list_prices(
    State(state): State<AppState>,
    Query(filter): Query<catalog::ItemFilter>,
) -> Result<Json<serde_json::Value>> {
    let ctx = state.context();
    let rows = catalog::prices(ctx.store.as_ref(), &filter).await?;
    Ok(Json(serde_json::json!({ "data": rows })))
}

async fn list_stock(
    State(state): State<AppState>,
    Query(filter): Query<catalog::ItemFilter>,
) -> Result<Json<serde_json::Value>> {
    let ctx = state.context();
    let rows = catalog::stock(ctx.store.as_ref(), &filter).await?;
    Ok(Json(serde_json::json!({ "data": rows })))
}

#[derive(Debug, Deserialize)]
struct CodesQuery {
    kind: String,
}

/// Reference-code tables the storefront syncs: freight expense names,
/// transport methods, payment methods, tax codes, today's USD rate and
/// the company's main currency.
async fn codes(
    State(state): State<AppState>,
    Query(q): Query<CodesQuery>,
) -> Result<Json<serde_json::Value>> {
    let ctx = state.context();
    let store = ctx.store.as_ref();
    let data = match q.kind.as_str() {
        "expense" => serde_json::to_value(catalog::expense_names(store).await?),
        "transport" => serde_json::to_value(catalog::transport_names(store).await?),
        "paymethod" => serde_json::to_value(catalog::payment_methods(store).await?),
        "taxcode" => serde_json::to_value(catalog::tax_codes(store).await?),
        "usdrate" => serde_json::to_value(catalog::usd_rate(store).await?),
        "currency" => serde_json::to_value(catalog::main_currency(store).await?),
        other => {
            return Err(GatewayError::Validation(format!(
                "unknown code kind '{other}'"
            )))
        }
    }
    .map_err(|e| GatewayError::Internal(format!("code serialization: {e}")))?;
    Ok(Json(serde_json::json!({ "data": data })))
}

async fn company_info(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let ctx = state.context();
    let info = ctx.erp.company_info().await?;
    Ok(Json(serde_json::json!({
        "company_name": info.company_name,
        "company_db": state.config.company_db,
    })))
}
