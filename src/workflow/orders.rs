//! Order submission: sales order, down payments, incoming payments, and
//! the raw link records tying them together.
//!
//! The linear state machine with one branch point: build and submit the
//! order, resolve its generated identifiers, then settle payments by
//! funding composition. A rejected document aborts everything downstream
//! of it; nothing already created is rolled back (resubmitting the same
//! web order id after a partial failure therefore duplicates documents —
//! known limitation).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::catalog;
use crate::config::{AppConfig, FundingAccounts};
use crate::erp::document::{
    DocumentDraft, DocumentKind, DownPaymentType, DraftLine, FreightExpense, InvoiceType,
    PaymentInvoice, BASE_TYPE_ORDER, BASE_TYPE_QUOTATION,
};
use crate::erp::{web_order_draft, GatewayContext};
use crate::error::{GatewayError, Result};

use super::{resolve_document, DocumentIds, DocumentTable};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderPayload {
    #[validate(length(min = 1))]
    pub web_order_id: String,
    #[validate(length(min = 1))]
    pub card_code: String,
    pub doc_due_date: NaiveDate,
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub items: Vec<OrderItem>,
    pub order_total: Decimal,
    /// Declared tax amount as the storefront renders it, e.g. `"0.00"`.
    pub order_tax: String,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub giftcard: bool,
    #[serde(default)]
    pub giftcard_amount: Option<Decimal>,
    #[serde(default)]
    pub shipping: Option<ShippingCost>,
    #[serde(default)]
    pub discount_percent: Option<Decimal>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub transport_name: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub quotation_id: Option<i64>,
    #[serde(default)]
    pub slp_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub itemcode: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingCost {
    pub freight_name: String,
    pub line_total: Decimal,
    pub tax_code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuotationPayload {
    #[validate(length(min = 1))]
    pub web_order_id: String,
    #[validate(length(min = 1))]
    pub card_code: String,
    pub doc_due_date: NaiveDate,
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelPayload {
    pub web_order_id: String,
}

/// Storefront card brands map onto the ERP's two-letter codes; anything
/// unmapped passes through verbatim.
fn card_type_code(raw: &str) -> String {
    match raw.to_ascii_uppercase().as_str() {
        "MASTERCARD" => "MC".to_string(),
        "VISA" => "VISA".to_string(),
        "AMERICAN EXPRESS" => "AMEX".to_string(),
        "DISCOVER" => "DC".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FundingSource {
    Cash,
    GiftCard,
}

impl FundingSource {
    fn transfer_account(self, accounts: &FundingAccounts) -> String {
        match self {
            FundingSource::Cash => accounts.cash_account.clone(),
            FundingSource::GiftCard => accounts.giftcard_account.clone(),
        }
    }
}

/// Splits the declared total across funding sources. Comparisons are exact
/// decimal with strict `<` / `>=`; whether vendor-side currency rounding
/// can land a value exactly on the boundary is an open question upstream,
/// so no tolerance is applied here.
fn funding_plan(total: Decimal, giftcard: Decimal) -> Vec<(FundingSource, Decimal)> {
    if giftcard <= Decimal::ZERO {
        vec![(FundingSource::Cash, total)]
    } else if giftcard < total {
        vec![
            (FundingSource::Cash, total - giftcard),
            (FundingSource::GiftCard, giftcard),
        ]
    } else {
        vec![(FundingSource::GiftCard, total)]
    }
}

/// Creates the sales order and its payment documents. Returns the order's
/// generated `DocEntry`.
pub async fn submit_order(
    ctx: &GatewayContext,
    config: &AppConfig,
    payload: &OrderPayload,
) -> Result<i64> {
    payload
        .validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let expense_code = match &payload.shipping {
        Some(shipping) => {
            Some(catalog::expense_code(ctx.store.as_ref(), &shipping.freight_name).await?)
        }
        None => None,
    };
    let transport_code = match &payload.transport_name {
        Some(name) => Some(catalog::transport_code(ctx.store.as_ref(), name).await?),
        None => None,
    };

    let draft = build_order_draft(payload, config, expense_code, transport_code)?;
    ctx.erp.add_document(&draft).await?;

    let order = resolve_document(
        ctx.store.as_ref(),
        DocumentTable::Orders,
        &payload.web_order_id,
        None,
    )
    .await?;
    tracing::info!(
        web_order_id = %payload.web_order_id,
        doc_entry = order.doc_entry,
        doc_num = order.doc_num,
        "sales order created"
    );

    // Fields the DI API will not take at creation time go in as raw
    // updates against the freshly resolved entry.
    if let Some(slp_code) = payload.slp_code {
        ctx.store
            .execute(
                "UPDATE ORDR SET SlpCode = $1 WHERE DocEntry = $2",
                &[slp_code.into(), order.doc_entry.into()],
            )
            .await?;
    }
    if let Some(quotation_id) = payload.quotation_id {
        link_order_to_quotation(ctx, order.doc_entry, quotation_id).await?;
    }

    if payload.order_total > Decimal::ZERO {
        settle_payments(ctx, config, payload, order).await?;
    }

    Ok(order.doc_entry)
}

fn build_order_draft(
    payload: &OrderPayload,
    config: &AppConfig,
    expense_code: Option<i64>,
    transport_code: Option<i64>,
) -> Result<DocumentDraft> {
    let mut draft = web_order_draft(
        DocumentKind::Order,
        &payload.card_code,
        &payload.web_order_id,
        Some(payload.doc_due_date),
    );
    draft.comments = payload.comments.clone();
    draft.discount_percent = payload.discount_percent;
    draft.transportation_code = transport_code;
    draft.payment_method = payload.payment_method.clone();
    draft.set_user_field("U_WebOrderId", &payload.web_order_id);
    if let Some(card_type) = &payload.card_type {
        draft.set_user_field("U_CardType", card_type_code(card_type));
    }
    if let (Some(expense_code), Some(shipping)) = (expense_code, &payload.shipping) {
        draft.expense = Some(FreightExpense {
            expense_code,
            line_total: shipping.line_total,
            tax_code: shipping.tax_code.clone(),
        });
    }

    for item in &payload.items {
        draft.push_line(match item.price {
            Some(price) => DraftLine::priced(&item.itemcode, item.quantity, price),
            None => DraftLine::new(&item.itemcode, item.quantity),
        });
    }
    // The storefront declares tax as a rendered amount; anything other
    // than the literal "0.00" becomes a synthetic line.
    if payload.order_tax != "0.00" {
        let tax: Decimal = payload.order_tax.parse().map_err(|_| {
            GatewayError::Validation(format!("order_tax '{}' is not a decimal", payload.order_tax))
        })?;
        draft.push_line(DraftLine::priced(
            &config.tax_item_code,
            Decimal::ONE,
            tax,
        ));
    }
    Ok(draft)
}

/// Creates one down payment and one incoming payment per funding slice,
/// linking each down payment back to the order. Runs only for totals
/// greater than zero.
async fn settle_payments(
    ctx: &GatewayContext,
    config: &AppConfig,
    payload: &OrderPayload,
    order: DocumentIds,
) -> Result<()> {
    let giftcard = if payload.giftcard {
        payload.giftcard_amount.unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    let mut previous_entry: Option<i64> = None;
    for (source, amount) in funding_plan(payload.order_total, giftcard) {
        let mut down_payment = web_order_draft(
            DocumentKind::DownPayment,
            &payload.card_code,
            &payload.web_order_id,
            Some(payload.doc_due_date),
        );
        down_payment.down_payment_type = Some(DownPaymentType::Invoice);
        down_payment.doc_total = Some(amount);
        for item in &payload.items {
            down_payment.push_line(match item.price {
                Some(price) => DraftLine::priced(&item.itemcode, item.quantity, price),
                None => DraftLine::new(&item.itemcode, item.quantity),
            });
        }
        ctx.erp.add_document(&down_payment).await?;

        let ids = resolve_document(
            ctx.store.as_ref(),
            DocumentTable::DownPayments,
            &payload.web_order_id,
            previous_entry,
        )
        .await?;
        previous_entry = Some(ids.doc_entry);
        link_down_payment(ctx, ids.doc_entry, order).await?;
        tracing::info!(
            web_order_id = %payload.web_order_id,
            doc_entry = ids.doc_entry,
            funding = ?source,
            %amount,
            "down payment created and linked"
        );

        let mut payment = DocumentDraft::new(DocumentKind::IncomingPayment, &payload.card_code);
        payment.num_at_card = Some(payload.web_order_id.clone());
        payment.transfer_account = Some(source.transfer_account(&config.funding));
        payment.transfer_sum = Some(amount);
        payment.invoices.push(PaymentInvoice {
            doc_entry: ids.doc_entry,
            invoice_type: InvoiceType::DownPayment,
            sum_applied: amount,
        });
        ctx.erp.add_document(&payment).await?;
    }
    Ok(())
}

/// Back-fills the down payment's line base references; the DI API offers
/// no way to attach a down payment to an order at creation time.
async fn link_down_payment(
    ctx: &GatewayContext,
    down_payment_entry: i64,
    order: DocumentIds,
) -> Result<()> {
    ctx.store
        .execute(
            &format!(
                "UPDATE DPI1 SET BaseType = {BASE_TYPE_ORDER}, BaseEntry = $1, BaseRef = $2 \
                 WHERE DocEntry = $3"
            ),
            &[
                order.doc_entry.into(),
                order.doc_num.into(),
                down_payment_entry.into(),
            ],
        )
        .await?;
    Ok(())
}

async fn link_order_to_quotation(
    ctx: &GatewayContext,
    order_entry: i64,
    quotation_entry: i64,
) -> Result<()> {
    ctx.store
        .execute(
            &format!(
                "UPDATE RDR1 SET BaseRef = q.DocNum, BaseType = {BASE_TYPE_QUOTATION}, \
                 BaseEntry = q.DocEntry FROM OQUT q \
                 WHERE RDR1.DocEntry = $1 AND q.DocEntry = $2"
            ),
            &[order_entry.into(), quotation_entry.into()],
        )
        .await?;
    Ok(())
}

/// Creates a sales quotation; same draft/add/resolve protocol as orders,
/// with no payment documents.
pub async fn submit_quotation(ctx: &GatewayContext, payload: &QuotationPayload) -> Result<i64> {
    payload
        .validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let mut draft = web_order_draft(
        DocumentKind::Quotation,
        &payload.card_code,
        &payload.web_order_id,
        Some(payload.doc_due_date),
    );
    for item in &payload.items {
        draft.push_line(match item.price {
            Some(price) => DraftLine::priced(&item.itemcode, item.quantity, price),
            None => DraftLine::new(&item.itemcode, item.quantity),
        });
    }
    ctx.erp.add_document(&draft).await?;

    let ids = resolve_document(
        ctx.store.as_ref(),
        DocumentTable::Quotations,
        &payload.web_order_id,
        None,
    )
    .await?;
    Ok(ids.doc_entry)
}

/// Cancels an order located by its web order id.
pub async fn cancel_order(ctx: &GatewayContext, payload: &CancelPayload) -> Result<i64> {
    let order = super::find_document(
        ctx.store.as_ref(),
        DocumentTable::Orders,
        &payload.web_order_id,
    )
    .await?
    .ok_or_else(|| GatewayError::NotFound(format!("order '{}'", payload.web_order_id)))?;
    ctx.erp.cancel_order(order.doc_entry).await?;
    Ok(order.doc_entry)
}
