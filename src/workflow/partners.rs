//! Business partner and contact maintenance.
//!
//! Card codes are allocated by the gateway (`C` + zero-padded sequence)
//! because the vendor assigns none for manually keyed partners; the
//! current maximum is read from the store and incremented.

use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::config::AppConfig;
use crate::erp::{ContactDraft, GatewayContext, PartnerAddress, PartnerDraft};
use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CustomerPayload {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Federal tax id (RFC and the like).
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub address: Option<PartnerAddress>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContactPayload {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Creates a business partner and returns its allocated card code.
pub async fn insert_customer(
    ctx: &GatewayContext,
    config: &AppConfig,
    payload: &CustomerPayload,
) -> Result<String> {
    payload
        .validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let row = ctx
        .store
        .fetch_one(
            "SELECT MAX(CardCode) AS CardCode FROM OCRD WHERE CardType = 'C'",
            &[],
        )
        .await?;
    let last = row.and_then(|r| r.get_str("CardCode").map(str::to_string));
    let card_code = next_card_code(last.as_deref())?;

    let draft = PartnerDraft {
        card_code: Some(card_code.clone()),
        card_name: format!("{} {}", payload.first_name, payload.last_name),
        group_code: Some(config.partner_group_code),
        phone: payload.phone.clone(),
        email: payload.email.clone(),
        federal_tax_id: payload.tax_id.clone(),
        address: payload.address.clone(),
        contact: Some(ContactDraft {
            name: format!("{} {}", payload.first_name, payload.last_name),
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            phone: payload.phone.clone(),
            email: payload.email.clone(),
            address: None,
        }),
    };
    ctx.erp.add_partner(&draft).await?;
    tracing::info!(%card_code, "business partner created");
    Ok(card_code)
}

/// Applies changed master data to an existing partner.
pub async fn update_customer(
    ctx: &GatewayContext,
    card_code: &str,
    payload: &CustomerPayload,
) -> Result<()> {
    payload
        .validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let draft = PartnerDraft {
        card_code: None,
        card_name: format!("{} {}", payload.first_name, payload.last_name),
        group_code: None,
        phone: payload.phone.clone(),
        email: payload.email.clone(),
        federal_tax_id: payload.tax_id.clone(),
        address: payload.address.clone(),
        contact: None,
    };
    ctx.erp.update_partner(card_code, &draft).await
}

/// Appends a contact person to a partner and returns the generated
/// contact code.
pub async fn insert_contact(
    ctx: &GatewayContext,
    card_code: &str,
    payload: &ContactPayload,
) -> Result<i64> {
    payload
        .validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    // OCPR names are unique per partner; suffix with the epoch second the
    // way the storefront integration always has.
    let full_name = format!("{} {}", payload.first_name, payload.last_name);
    let name = format!("{} {}", truncate(&full_name, 36), Utc::now().timestamp());
    let contact = ContactDraft {
        name: name.clone(),
        first_name: payload.first_name.clone(),
        last_name: payload.last_name.clone(),
        phone: payload.phone.clone(),
        email: payload.email.clone(),
        address: payload.address.as_deref().map(|a| truncate(a, 100).to_string()),
    };
    ctx.erp.add_contact(card_code, &contact).await?;

    ctx.store
        .fetch_one(
            "SELECT CntctCode FROM OCPR WHERE CardCode = $1 AND Name = $2 \
             ORDER BY CntctCode DESC LIMIT 1",
            &[card_code.into(), name.as_str().into()],
        )
        .await?
        .and_then(|r| r.get_i64("CntctCode"))
        .ok_or_else(|| {
            GatewayError::DataConsistency(format!(
                "contact '{name}' not found on partner {card_code} after add"
            ))
        })
}

fn next_card_code(last: Option<&str>) -> Result<String> {
    let sequence = match last.filter(|s| !s.is_empty()) {
        Some(code) => code
            .trim_start_matches(['C', 'c'])
            .parse::<u64>()
            .map_err(|_| {
                GatewayError::DataConsistency(format!("unparseable max CardCode '{code}'"))
            })?,
        None => 0,
    };
    Ok(format!("C{:05}", sequence + 1))
}

fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreRow;
    use crate::workflow::testing::{context, test_config, MockErp, ScriptedStore};
    use std::sync::Arc;

    #[test]
    fn card_codes_increment_from_the_stored_maximum() {
        assert_eq!(next_card_code(Some("C00041")).unwrap(), "C00042");
        assert_eq!(next_card_code(None).unwrap(), "C00001");
        assert_eq!(next_card_code(Some("")).unwrap(), "C00001");
        assert!(next_card_code(Some("XYZ")).is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
    }

    #[tokio::test]
    async fn insert_allocates_the_next_card_code() {
        let erp = Arc::new(MockErp::default());
        let store = Arc::new(ScriptedStore::default());
        store.queue(vec![StoreRow(vec![(
            "CardCode".into(),
            serde_json::Value::String("C00009".into()),
        )])]);
        let ctx = context(&erp, &store);

        let config = test_config();
        let payload = CustomerPayload {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: Some("555-0100".into()),
            email: Some("ada@example.com".into()),
            tax_id: None,
            address: None,
        };
        let code = insert_customer(&ctx, &config, &payload).await.unwrap();
        assert_eq!(code, "C00010");

        let partners = erp.partners.lock().unwrap();
        let (target, draft) = &partners[0];
        assert!(target.is_none());
        assert_eq!(draft.card_code.as_deref(), Some("C00010"));
        assert_eq!(draft.card_name, "Ada Lovelace");
        assert_eq!(draft.group_code, Some(100));
    }

    #[tokio::test]
    async fn contact_insert_resolves_the_generated_code() {
        let erp = Arc::new(MockErp::default());
        let store = Arc::new(ScriptedStore::default());
        store.queue(vec![StoreRow(vec![("CntctCode".into(), 7.into())])]);
        let ctx = context(&erp, &store);

        let payload = ContactPayload {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: None,
            email: None,
            address: Some("x".repeat(200)),
        };
        let code = insert_contact(&ctx, "C00010", &payload).await.unwrap();
        assert_eq!(code, 7);

        let contacts = erp.contacts.lock().unwrap();
        assert_eq!(contacts[0].0, "C00010");
        assert!(contacts[0].1.name.starts_with("Ada Lovelace "));
        assert_eq!(contacts[0].1.address.as_ref().unwrap().len(), 100);
    }
}
