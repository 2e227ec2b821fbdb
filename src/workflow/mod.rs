//! Multi-step document workflows.
//!
//! The automation API reports only a status code on add, so every created
//! document is re-located through the store by its correlation key (the
//! web order id carried in `NumAtCard`). The store lags the DI commit
//! slightly, hence the bounded retry on resolution.

pub mod orders;
pub mod partners;
pub mod shipments;

use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::store::DocumentStore;

/// Vendor header tables the gateway resolves generated identifiers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentTable {
    Orders,
    Quotations,
    DownPayments,
    Deliveries,
    Invoices,
}

impl DocumentTable {
    pub fn header(self) -> &'static str {
        match self {
            DocumentTable::Orders => "ORDR",
            DocumentTable::Quotations => "OQUT",
            DocumentTable::DownPayments => "ODPI",
            DocumentTable::Deliveries => "ODLN",
            DocumentTable::Invoices => "OINV",
        }
    }

    pub fn lines(self) -> &'static str {
        match self {
            DocumentTable::Orders => "RDR1",
            DocumentTable::Quotations => "QUT1",
            DocumentTable::DownPayments => "DPI1",
            DocumentTable::Deliveries => "DLN1",
            DocumentTable::Invoices => "INV1",
        }
    }
}

/// Identifiers the vendor assigns at creation time and never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentIds {
    pub doc_entry: i64,
    pub doc_num: i64,
}

const RESOLVE_ATTEMPTS: u32 = 5;
const RESOLVE_BACKOFF: Duration = Duration::from_millis(200);

/// Re-locates a just-created document by correlation key. `after` excludes
/// entries at or below a previously resolved one, so two documents of the
/// same kind created for one web order resolve distinctly.
pub async fn resolve_document(
    store: &dyn DocumentStore,
    table: DocumentTable,
    correlation_key: &str,
    after: Option<i64>,
) -> Result<DocumentIds> {
    let sql = match after {
        None => format!(
            "SELECT DocEntry, DocNum FROM {} WHERE NumAtCard = $1 \
             ORDER BY DocEntry DESC LIMIT 1",
            table.header()
        ),
        Some(_) => format!(
            "SELECT DocEntry, DocNum FROM {} WHERE NumAtCard = $1 AND DocEntry > $2 \
             ORDER BY DocEntry DESC LIMIT 1",
            table.header()
        ),
    };
    let mut args = vec![correlation_key.into()];
    if let Some(entry) = after {
        args.push(entry.into());
    }

    for attempt in 1..=RESOLVE_ATTEMPTS {
        if let Some(row) = store.fetch_one(&sql, &args).await? {
            let doc_entry = row.get_i64("DocEntry");
            let doc_num = row.get_i64("DocNum");
            if let (Some(doc_entry), Some(doc_num)) = (doc_entry, doc_num) {
                return Ok(DocumentIds { doc_entry, doc_num });
            }
        }
        if attempt < RESOLVE_ATTEMPTS {
            tokio::time::sleep(RESOLVE_BACKOFF * attempt).await;
        }
    }
    Err(GatewayError::DataConsistency(format!(
        "no {} row for correlation key '{correlation_key}' after the ERP reported success",
        table.header()
    )))
}

/// Looks up an existing document by correlation key, newest entry first.
/// Unlike [`resolve_document`] this does not retry; it is for documents
/// created by an earlier request.
pub async fn find_document(
    store: &dyn DocumentStore,
    table: DocumentTable,
    correlation_key: &str,
) -> Result<Option<DocumentIds>> {
    let sql = format!(
        "SELECT DocEntry, DocNum FROM {} WHERE NumAtCard = $1 \
         ORDER BY DocEntry DESC LIMIT 1",
        table.header()
    );
    let row = store.fetch_one(&sql, &[correlation_key.into()]).await?;
    Ok(row.and_then(|r| {
        match (r.get_i64("DocEntry"), r.get_i64("DocNum")) {
            (Some(doc_entry), Some(doc_num)) => Some(DocumentIds { doc_entry, doc_num }),
            _ => None,
        }
    }))
}

/// Finds the line number a given item occupies in a source document, for
/// `BaseLine` back-references. The DI API gives no handle to "the line I
/// just added", so the join is the only way back in.
pub async fn resolve_base_line(
    store: &dyn DocumentStore,
    table: DocumentTable,
    doc_entry: i64,
    item_code: &str,
) -> Result<i64> {
    let sql = format!(
        "SELECT LineNum FROM {} WHERE DocEntry = $1 AND ItemCode = $2 \
         ORDER BY LineNum LIMIT 1",
        table.lines()
    );
    let row = store
        .fetch_one(&sql, &[doc_entry.into(), item_code.into()])
        .await?;
    row.and_then(|r| r.get_i64("LineNum")).ok_or_else(|| {
        GatewayError::DataConsistency(format!(
            "item '{item_code}' not found on {} document {doc_entry}",
            table.header()
        ))
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-rolled port mocks shared by the workflow tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::erp::document::{DocumentDraft, DocumentKind};
    use crate::erp::{CompanyInfo, ContactDraft, ErpSession, PartnerDraft};
    use crate::error::{GatewayError, Result};
    use crate::store::{DocumentStore, SqlArg, StoreRow};

    /// Records submitted drafts; optionally rejects a given document kind.
    #[derive(Default)]
    pub struct MockErp {
        pub added: Mutex<Vec<DocumentDraft>>,
        pub cancelled: Mutex<Vec<i64>>,
        pub partners: Mutex<Vec<(Option<String>, PartnerDraft)>>,
        pub contacts: Mutex<Vec<(String, ContactDraft)>>,
        pub reject_kind: Option<DocumentKind>,
    }

    impl MockErp {
        pub fn rejecting(kind: DocumentKind) -> Self {
            Self {
                reject_kind: Some(kind),
                ..Self::default()
            }
        }

        pub fn added_of(&self, kind: DocumentKind) -> Vec<DocumentDraft> {
            self.added
                .lock()
                .unwrap()
                .iter()
                .filter(|d| d.kind == kind)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl ErpSession for MockErp {
        async fn add_document(&self, draft: &DocumentDraft) -> Result<()> {
            if self.reject_kind == Some(draft.kind) {
                return Err(GatewayError::DocumentRejected {
                    code: -1,
                    description: format!("{:?} rejected", draft.kind),
                });
            }
            self.added.lock().unwrap().push(draft.clone());
            Ok(())
        }

        async fn cancel_order(&self, doc_entry: i64) -> Result<()> {
            self.cancelled.lock().unwrap().push(doc_entry);
            Ok(())
        }

        async fn add_partner(&self, draft: &PartnerDraft) -> Result<()> {
            self.partners.lock().unwrap().push((None, draft.clone()));
            Ok(())
        }

        async fn update_partner(&self, card_code: &str, draft: &PartnerDraft) -> Result<()> {
            self.partners
                .lock()
                .unwrap()
                .push((Some(card_code.to_string()), draft.clone()));
            Ok(())
        }

        async fn add_contact(&self, card_code: &str, contact: &ContactDraft) -> Result<()> {
            self.contacts
                .lock()
                .unwrap()
                .push((card_code.to_string(), contact.clone()));
            Ok(())
        }

        async fn company_info(&self) -> Result<CompanyInfo> {
            Ok(CompanyInfo {
                company_name: "TEST".into(),
            })
        }
    }

    // Arc forwarding impls let a test keep its mock handle for assertions
    // after boxing it into a GatewayContext.
    #[async_trait]
    impl ErpSession for std::sync::Arc<MockErp> {
        async fn add_document(&self, draft: &DocumentDraft) -> Result<()> {
            (**self).add_document(draft).await
        }
        async fn cancel_order(&self, doc_entry: i64) -> Result<()> {
            (**self).cancel_order(doc_entry).await
        }
        async fn add_partner(&self, draft: &PartnerDraft) -> Result<()> {
            (**self).add_partner(draft).await
        }
        async fn update_partner(&self, card_code: &str, draft: &PartnerDraft) -> Result<()> {
            (**self).update_partner(card_code, draft).await
        }
        async fn add_contact(&self, card_code: &str, contact: &ContactDraft) -> Result<()> {
            (**self).add_contact(card_code, contact).await
        }
        async fn company_info(&self) -> Result<CompanyInfo> {
            (**self).company_info().await
        }
    }

    /// Serves queued fetch results in call order and logs every statement.
    #[derive(Default)]
    pub struct ScriptedStore {
        pub fetches: Mutex<VecDeque<Vec<StoreRow>>>,
        pub fetch_log: Mutex<Vec<(String, Vec<SqlArg>)>>,
        pub execute_log: Mutex<Vec<(String, Vec<SqlArg>)>>,
    }

    impl ScriptedStore {
        pub fn queue(&self, rows: Vec<StoreRow>) {
            self.fetches.lock().unwrap().push_back(rows);
        }

        pub fn queue_ids(&self, doc_entry: i64, doc_num: i64) {
            self.queue(vec![StoreRow(vec![
                ("DocEntry".into(), doc_entry.into()),
                ("DocNum".into(), doc_num.into()),
            ])]);
        }

        pub fn executed(&self) -> Vec<(String, Vec<SqlArg>)> {
            self.execute_log.lock().unwrap().clone()
        }
    }

    pub fn context(
        erp: &std::sync::Arc<MockErp>,
        store: &std::sync::Arc<ScriptedStore>,
    ) -> crate::erp::GatewayContext {
        crate::erp::GatewayContext::new(Box::new(erp.clone()), Box::new(store.clone()))
    }

    pub fn test_config() -> crate::config::AppConfig {
        crate::config::AppConfig {
            http_port: 0,
            database_url: String::new(),
            nats_url: String::new(),
            erp_subject_prefix: "sapb1".into(),
            company_db: "TESTDB".into(),
            license_server: String::new(),
            locale: "ln_English".into(),
            use_trusted: false,
            jwt_secret: "secret".into(),
            api_users: std::collections::HashMap::new(),
            funding: crate::config::FundingAccounts {
                cash_account: "_SYS00000000011".into(),
                giftcard_account: "_SYS00000000012".into(),
            },
            tax_item_code: "TAX".into(),
            partner_group_code: 100,
        }
    }

    #[async_trait]
    impl DocumentStore for std::sync::Arc<ScriptedStore> {
        async fn fetch_all(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<StoreRow>> {
            (**self).fetch_all(sql, args).await
        }
        async fn execute(&self, sql: &str, args: &[SqlArg]) -> Result<u64> {
            (**self).execute(sql, args).await
        }
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        async fn fetch_all(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<StoreRow>> {
            self.fetch_log
                .lock()
                .unwrap()
                .push((sql.to_string(), args.to_vec()));
            Ok(self
                .fetches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn execute(&self, sql: &str, args: &[SqlArg]) -> Result<u64> {
            self.execute_log
                .lock()
                .unwrap()
                .push((sql.to_string(), args.to_vec()));
            Ok(1)
        }
    }
}
