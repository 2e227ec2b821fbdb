//! Marketing-document drafts sent to the automation bridge.
//!
//! A draft mirrors the ordered property assignment the DI API expects:
//! header fields, user-defined fields, then lines. Serialized field names
//! match the DI object model so the bridge can apply them one-to-one.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// DI `BoObjectTypes` for the document kinds the gateway creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum DocumentKind {
    Order,
    Quotation,
    DownPayment,
    IncomingPayment,
    Delivery,
    Invoice,
}

/// Source-document object types used in line back-references.
pub const BASE_TYPE_DELIVERY: i64 = 15;
pub const BASE_TYPE_ORDER: i64 = 17;
pub const BASE_TYPE_QUOTATION: i64 = 23;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentDraft {
    pub kind: DocumentKind,
    pub card_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_due_date: Option<NaiveDate>,
    /// Correlation key; every document created for a web order carries the
    /// web order id here so it can be re-located by query afterwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_at_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transportation_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Assigned in insertion order, like `UserFields.Fields(..)`.
    pub user_fields: Vec<UserField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense: Option<FreightExpense>,
    /// Down payments only: `dptInvoice` plus the declared total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_payment_type: Option<DownPaymentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_total: Option<Decimal>,
    /// Incoming payments only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_sum: Option<Decimal>,
    pub invoices: Vec<PaymentInvoice>,
    /// Invoices only: down payments drawn against the document total.
    pub down_payments_to_draw: Vec<DrawnDownPayment>,
    pub lines: Vec<DraftLine>,
}

impl DocumentDraft {
    pub fn new(kind: DocumentKind, card_code: impl Into<String>) -> Self {
        Self {
            kind,
            card_code: card_code.into(),
            doc_due_date: None,
            num_at_card: None,
            comments: None,
            discount_percent: None,
            transportation_code: None,
            payment_method: None,
            user_fields: Vec::new(),
            expense: None,
            down_payment_type: None,
            doc_total: None,
            transfer_account: None,
            transfer_sum: None,
            invoices: Vec::new(),
            down_payments_to_draw: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn set_user_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.user_fields.push(UserField {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn push_line(&mut self, line: DraftLine) {
        self.lines.push(line);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DraftLine {
    pub item_code: String,
    pub quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    /// Back-reference to a source document line; set only where the link
    /// can be expressed at creation time (delivery and invoice lines).
    #[serde(flatten)]
    pub base: Option<BaseRef>,
}

impl DraftLine {
    pub fn new(item_code: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            item_code: item_code.into(),
            quantity,
            unit_price: None,
            base: None,
        }
    }

    pub fn priced(item_code: impl Into<String>, quantity: Decimal, price: Decimal) -> Self {
        Self {
            unit_price: Some(price),
            ..Self::new(item_code, quantity)
        }
    }

    pub fn based_on(mut self, base_type: i64, base_entry: i64, base_line: i64) -> Self {
        self.base = Some(BaseRef {
            base_type,
            base_entry,
            base_line,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseRef {
    pub base_type: i64,
    pub base_entry: i64,
    pub base_line: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FreightExpense {
    pub expense_code: i64,
    pub line_total: Decimal,
    pub tax_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DownPaymentType {
    #[serde(rename = "dptInvoice")]
    Invoice,
}

/// An invoice an incoming payment settles. Down-payment invoices use the
/// DI `it_DownPayment` invoice type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentInvoice {
    pub doc_entry: i64,
    pub invoice_type: InvoiceType,
    pub sum_applied: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvoiceType {
    #[serde(rename = "it_DownPayment")]
    DownPayment,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DrawnDownPayment {
    pub doc_entry: i64,
    pub amount_to_draw: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_serializes_with_di_property_names() {
        let mut draft = DocumentDraft::new(DocumentKind::Order, "C20000");
        draft.num_at_card = Some("WO-1001".into());
        draft.set_user_field("U_WebOrderId", "WO-1001");
        draft.push_line(DraftLine::priced(
            "SKU1",
            Decimal::from(2),
            "10.00".parse().unwrap(),
        ));

        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["Kind"], "Order");
        assert_eq!(json["CardCode"], "C20000");
        assert_eq!(json["NumAtCard"], "WO-1001");
        assert_eq!(json["UserFields"][0]["Name"], "U_WebOrderId");
        assert_eq!(json["Lines"][0]["ItemCode"], "SKU1");
        assert!(json.get("DocDueDate").is_none());
    }

    #[test]
    fn based_line_flattens_base_ref() {
        let line =
            DraftLine::new("SKU1", Decimal::from(1)).based_on(BASE_TYPE_ORDER, 42, 0);
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["BaseType"], 17);
        assert_eq!(json["BaseEntry"], 42);
        assert_eq!(json["BaseLine"], 0);
    }
}
