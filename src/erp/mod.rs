//! ERP automation port.
//!
//! The DI company connection is stateful and lives out of process; this
//! module defines the session port the workflows talk to and the
//! per-request context that carries both collaborator handles.

pub mod bridge;
pub mod document;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::DocumentStore;
use document::DocumentDraft;

/// One authenticated automation connection, held for the duration of a
/// request context. Submitting a draft either persists the whole document
/// or rejects it; a rejection is terminal for that document and nothing
/// dependent on it may run.
#[async_trait]
pub trait ErpSession: Send + Sync {
    async fn add_document(&self, draft: &DocumentDraft) -> Result<()>;

    async fn cancel_order(&self, doc_entry: i64) -> Result<()>;

    async fn add_partner(&self, draft: &PartnerDraft) -> Result<()>;

    /// Applies changed fields to an existing partner by card code.
    async fn update_partner(&self, card_code: &str, draft: &PartnerDraft) -> Result<()>;

    /// Appends a contact row to an existing partner.
    async fn add_contact(&self, card_code: &str, contact: &ContactDraft) -> Result<()>;

    async fn company_info(&self) -> Result<CompanyInfo>;
}

/// Both collaborator handles for one request. Built on first use by a
/// handler, passed by reference through the workflows, and dropped on
/// every exit path when the request ends.
pub struct GatewayContext {
    pub erp: Box<dyn ErpSession>,
    pub store: Box<dyn DocumentStore>,
}

impl GatewayContext {
    pub fn new(erp: Box<dyn ErpSession>, store: Box<dyn DocumentStore>) -> Self {
        Self { erp, store }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompanyInfo {
    pub company_name: String,
}

/// Business-partner master data for insert/update.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartnerDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_code: Option<String>,
    pub card_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federal_tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<PartnerAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactDraft>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartnerAddress {
    pub street: String,
    #[serde(default)]
    pub street_no: Option<String>,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub zip_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactDraft {
    /// OCPR `Name`, unique per partner.
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Shared draft defaults used by both workflow modules.
pub fn web_order_draft(
    kind: document::DocumentKind,
    card_code: &str,
    web_order_id: &str,
    due_date: Option<NaiveDate>,
) -> DocumentDraft {
    let mut draft = DocumentDraft::new(kind, card_code);
    draft.num_at_card = Some(web_order_id.to_string());
    draft.doc_due_date = due_date;
    draft
}
