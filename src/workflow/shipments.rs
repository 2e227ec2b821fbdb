//! Shipment fulfillment: delivery plus follow-up invoice.
//!
//! Sequential, no branching. Every delivery line back-references its order
//! line, and every invoice line its delivery line, with the line numbers
//! recovered by per-item joins because the DI API exposes no handle to a
//! line after the document is created. Any step failing is fatal; nothing
//! already created is removed.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::erp::document::{
    DocumentKind, DraftLine, DrawnDownPayment, BASE_TYPE_DELIVERY, BASE_TYPE_ORDER,
};
use crate::erp::{web_order_draft, GatewayContext};
use crate::error::{GatewayError, Result};

use super::{
    find_document, resolve_base_line, resolve_document, DocumentTable,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShipmentPayload {
    #[validate(length(min = 1))]
    pub web_order_id: String,
    #[validate(length(min = 1))]
    pub card_code: String,
    pub doc_due_date: NaiveDate,
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub items: Vec<ShipmentItem>,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub itemcode: String,
    pub quantity: Decimal,
}

/// Creates the delivery and invoice for a previously submitted order.
/// Returns the delivery's generated `DocEntry`.
pub async fn fulfill_shipment(ctx: &GatewayContext, payload: &ShipmentPayload) -> Result<i64> {
    payload
        .validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let store = ctx.store.as_ref();
    let order = find_document(store, DocumentTable::Orders, &payload.web_order_id)
        .await?
        .ok_or_else(|| {
            GatewayError::NotFound(format!("order '{}'", payload.web_order_id))
        })?;

    let mut delivery = web_order_draft(
        DocumentKind::Delivery,
        &payload.card_code,
        &payload.web_order_id,
        Some(payload.doc_due_date),
    );
    delivery.comments = payload.comments.clone();
    for item in &payload.items {
        let base_line =
            resolve_base_line(store, DocumentTable::Orders, order.doc_entry, &item.itemcode)
                .await?;
        delivery.push_line(
            DraftLine::new(&item.itemcode, item.quantity).based_on(
                BASE_TYPE_ORDER,
                order.doc_entry,
                base_line,
            ),
        );
    }
    ctx.erp.add_document(&delivery).await?;

    let delivery_ids = resolve_document(
        store,
        DocumentTable::Deliveries,
        &payload.web_order_id,
        None,
    )
    .await?;
    tracing::info!(
        web_order_id = %payload.web_order_id,
        doc_entry = delivery_ids.doc_entry,
        "delivery created"
    );

    let delivery_total = store
        .fetch_one(
            "SELECT DocTotal FROM ODLN WHERE DocEntry = $1",
            &[delivery_ids.doc_entry.into()],
        )
        .await?
        .and_then(|r| r.get_decimal("DocTotal"))
        .ok_or_else(|| {
            GatewayError::DataConsistency(format!(
                "delivery {} has no DocTotal",
                delivery_ids.doc_entry
            ))
        })?;

    // The advance collected at order time is drawn down in full against
    // this invoice.
    let down_payment = find_document(store, DocumentTable::DownPayments, &payload.web_order_id)
        .await?
        .ok_or_else(|| {
            GatewayError::DataConsistency(format!(
                "no down payment recorded for '{}'",
                payload.web_order_id
            ))
        })?;

    let mut invoice = web_order_draft(
        DocumentKind::Invoice,
        &payload.card_code,
        &payload.web_order_id,
        Some(payload.doc_due_date),
    );
    for item in &payload.items {
        let base_line = resolve_base_line(
            store,
            DocumentTable::Deliveries,
            delivery_ids.doc_entry,
            &item.itemcode,
        )
        .await?;
        invoice.push_line(
            DraftLine::new(&item.itemcode, item.quantity).based_on(
                BASE_TYPE_DELIVERY,
                delivery_ids.doc_entry,
                base_line,
            ),
        );
    }
    invoice.down_payments_to_draw.push(DrawnDownPayment {
        doc_entry: down_payment.doc_entry,
        amount_to_draw: delivery_total,
    });
    ctx.erp.add_document(&invoice).await?;

    Ok(delivery_ids.doc_entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreRow;
    use crate::workflow::testing::{context, MockErp, ScriptedStore};
    use std::sync::Arc;

    fn payload() -> ShipmentPayload {
        ShipmentPayload {
            web_order_id: "WO-1001".into(),
            card_code: "C20000".into(),
            doc_due_date: NaiveDate::from_ymd_opt(2026, 9, 5).unwrap(),
            items: vec![ShipmentItem {
                itemcode: "SKU1".into(),
                quantity: Decimal::from(2),
            }],
            comments: None,
        }
    }

    fn line_num_row(n: i64) -> Vec<StoreRow> {
        vec![StoreRow(vec![("LineNum".into(), n.into())])]
    }

    #[tokio::test]
    async fn delivery_and_invoice_back_reference_their_sources() {
        let erp = Arc::new(MockErp::default());
        let store = Arc::new(ScriptedStore::default());
        store.queue_ids(42, 1042); // order lookup
        store.queue(line_num_row(0)); // RDR1 join
        store.queue_ids(80, 1080); // delivery resolve
        store.queue(vec![StoreRow(vec![(
            "DocTotal".into(),
            serde_json::Value::String("20.00".into()),
        )])]);
        store.queue_ids(70, 1070); // down payment lookup
        store.queue(line_num_row(0)); // DLN1 join
        let ctx = context(&erp, &store);

        let entry = fulfill_shipment(&ctx, &payload()).await.unwrap();
        assert_eq!(entry, 80);

        let deliveries = erp.added_of(DocumentKind::Delivery);
        assert_eq!(deliveries.len(), 1);
        let base = deliveries[0].lines[0].base.unwrap();
        assert_eq!((base.base_type, base.base_entry, base.base_line), (17, 42, 0));

        let invoices = erp.added_of(DocumentKind::Invoice);
        assert_eq!(invoices.len(), 1);
        let base = invoices[0].lines[0].base.unwrap();
        assert_eq!((base.base_type, base.base_entry, base.base_line), (15, 80, 0));
        assert_eq!(invoices[0].down_payments_to_draw[0].doc_entry, 70);
        assert_eq!(
            invoices[0].down_payments_to_draw[0].amount_to_draw,
            "20.00".parse().unwrap()
        );
    }

    #[tokio::test]
    async fn empty_items_fail_validation() {
        let erp = Arc::new(MockErp::default());
        let store = Arc::new(ScriptedStore::default());
        let ctx = context(&erp, &store);

        let mut p = payload();
        p.items.clear();
        let err = fulfill_shipment(&ctx, &p).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(store.fetch_log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let erp = Arc::new(MockErp::default());
        let store = Arc::new(ScriptedStore::default());
        store.queue(vec![]);
        let ctx = context(&erp, &store);

        let err = fulfill_shipment(&ctx, &payload()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
        assert!(erp.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmatched_item_fails_before_the_delivery_is_submitted() {
        let erp = Arc::new(MockErp::default());
        let store = Arc::new(ScriptedStore::default());
        store.queue_ids(42, 1042);
        store.queue(vec![]); // item not on the order
        let ctx = context(&erp, &store);

        let err = fulfill_shipment(&ctx, &payload()).await.unwrap_err();
        assert!(matches!(err, GatewayError::DataConsistency(_)));
        assert!(erp.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_delivery_stops_short_of_the_invoice() {
        let erp = Arc::new(MockErp::rejecting(DocumentKind::Delivery));
        let store = Arc::new(ScriptedStore::default());
        store.queue_ids(42, 1042);
        store.queue(line_num_row(0));
        let ctx = context(&erp, &store);

        let err = fulfill_shipment(&ctx, &payload()).await.unwrap_err();
        assert!(matches!(err, GatewayError::DocumentRejected { .. }));
        assert!(erp.added_of(DocumentKind::Invoice).is_empty());
    }
}
