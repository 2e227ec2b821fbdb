//! NATS request-reply client for the Windows-side automation bridge.
//!
//! The DI API is COM and only runs next to the ERP server, so the gateway
//! ships drafts to a bridge process over NATS and gets back the vendor's
//! `(code, description)` pair. Code zero means the document persisted;
//! anything else means it did not.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

use super::document::DocumentDraft;
use super::{CompanyInfo, ContactDraft, ErpSession, PartnerDraft};

/// COM connect settings the bridge needs to open (or verify) the company
/// session: which company database, which license server, and whether the
/// connection is trusted.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProfile {
    pub company_db: String,
    pub license_server: String,
    pub locale: String,
    pub use_trusted: bool,
}

pub struct BridgeSession {
    client: async_nats::Client,
    prefix: String,
    profile: ConnectionProfile,
}

impl BridgeSession {
    pub fn new(
        client: async_nats::Client,
        prefix: impl Into<String>,
        profile: ConnectionProfile,
    ) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            profile,
        }
    }

    async fn request<T: Serialize>(&self, subject: &str, body: &T) -> Result<BridgeReply> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| GatewayError::Connection(format!("encode bridge request: {e}")))?;
        let subject = format!("{}.{subject}", self.prefix);
        let message = self
            .client
            .request(subject.clone(), payload.into())
            .await
            .map_err(|e| GatewayError::Connection(format!("bridge request {subject}: {e}")))?;
        serde_json::from_slice(&message.payload)
            .map_err(|e| GatewayError::Connection(format!("decode bridge reply {subject}: {e}")))
    }

    async fn transact<T: Serialize>(&self, subject: &str, body: &T) -> Result<()> {
        let reply = self.request(subject, body).await?;
        if reply.code != 0 {
            return Err(GatewayError::DocumentRejected {
                code: reply.code,
                description: reply.description,
            });
        }
        Ok(())
    }
}

/// Vendor status pair relayed by the bridge.
#[derive(Debug, Deserialize)]
struct BridgeReply {
    code: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    company_name: Option<String>,
}

#[derive(Serialize)]
struct CancelRequest {
    doc_entry: i64,
}

#[derive(Serialize)]
struct PartnerRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    card_code: Option<&'a str>,
    #[serde(flatten)]
    draft: &'a PartnerDraft,
}

#[derive(Serialize)]
struct ContactRequest<'a> {
    card_code: &'a str,
    #[serde(flatten)]
    contact: &'a ContactDraft,
}

#[async_trait]
impl ErpSession for BridgeSession {
    async fn add_document(&self, draft: &DocumentDraft) -> Result<()> {
        self.transact("document.add", draft).await
    }

    async fn cancel_order(&self, doc_entry: i64) -> Result<()> {
        self.transact("order.cancel", &CancelRequest { doc_entry }).await
    }

    async fn add_partner(&self, draft: &PartnerDraft) -> Result<()> {
        self.transact(
            "partner.add",
            &PartnerRequest {
                card_code: None,
                draft,
            },
        )
        .await
    }

    async fn update_partner(&self, card_code: &str, draft: &PartnerDraft) -> Result<()> {
        self.transact(
            "partner.update",
            &PartnerRequest {
                card_code: Some(card_code),
                draft,
            },
        )
        .await
    }

    async fn add_contact(&self, card_code: &str, contact: &ContactDraft) -> Result<()> {
        self.transact("partner.contact", &ContactRequest { card_code, contact })
            .await
    }

    async fn company_info(&self) -> Result<CompanyInfo> {
        let reply = self.request("session.info", &self.profile).await?;
        if reply.code != 0 {
            return Err(GatewayError::Connection(reply.description));
        }
        Ok(CompanyInfo {
            company_name: reply.company_name.unwrap_or_default(),
        })
    }
}
