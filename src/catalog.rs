//! Read-side queries against the vendor schema: catalog data, code
//! lookups, and document fetches the storefront polls. Rows pass through
//! the store normalization untouched.

use serde::Deserialize;

use crate::error::{GatewayError, Result};
use crate::store::{DocumentStore, SqlArg, StoreRow};

/// Vendor price list the storefront sells from.
const SALES_PRICE_LIST: i64 = 2;

const MAX_FETCH: i64 = 100;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(MAX_FETCH).clamp(1, MAX_FETCH)
}

pub async fn expense_code(store: &dyn DocumentStore, name: &str) -> Result<i64> {
    store
        .fetch_one(
            "SELECT ExpnsCode FROM OEXD WHERE ExpnsName = $1",
            &[name.into()],
        )
        .await?
        .and_then(|r| r.get_i64("ExpnsCode"))
        .ok_or_else(|| GatewayError::NotFound(format!("freight expense '{name}'")))
}

pub async fn transport_code(store: &dyn DocumentStore, name: &str) -> Result<i64> {
    store
        .fetch_one(
            "SELECT TrnspCode FROM OSHP WHERE TrnspName = $1",
            &[name.into()],
        )
        .await?
        .and_then(|r| r.get_i64("TrnspCode"))
        .ok_or_else(|| GatewayError::NotFound(format!("shipping type '{name}'")))
}

pub async fn expense_names(store: &dyn DocumentStore) -> Result<Vec<StoreRow>> {
    store.fetch_all("SELECT ExpnsName FROM OEXD", &[]).await
}

pub async fn transport_names(store: &dyn DocumentStore) -> Result<Vec<StoreRow>> {
    store.fetch_all("SELECT TrnspName FROM OSHP", &[]).await
}

pub async fn payment_methods(store: &dyn DocumentStore) -> Result<Vec<StoreRow>> {
    store.fetch_all("SELECT PayMethCod FROM OPYM", &[]).await
}

pub async fn tax_codes(store: &dyn DocumentStore) -> Result<Vec<StoreRow>> {
    store.fetch_all("SELECT Code, Name, Rate FROM OSTA", &[]).await
}

/// Exchange rate rows for the current date; empty when the rate has not
/// been entered yet.
pub async fn usd_rate(store: &dyn DocumentStore) -> Result<Vec<StoreRow>> {
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    store
        .fetch_all("SELECT Rate FROM ORTT WHERE RateDate = $1", &[today.as_str().into()])
        .await
}

pub async fn main_currency(store: &dyn DocumentStore) -> Result<String> {
    store
        .fetch_one("SELECT MainCurncy FROM OADM", &[])
        .await?
        .and_then(|r| r.get_str("MainCurncy").map(str::to_string))
        .ok_or_else(|| GatewayError::Store("company record (OADM) is missing".into()))
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub web_order_id: Option<String>,
    pub card_code: Option<String>,
    pub limit: Option<i64>,
}

pub async fn orders(store: &dyn DocumentStore, filter: &OrderFilter) -> Result<Vec<StoreRow>> {
    let mut sql = String::from(
        "SELECT DocEntry, DocNum, CardCode, NumAtCard, DocDate, DocDueDate, DocTotal, \
         DocStatus FROM ORDR",
    );
    let mut args: Vec<SqlArg> = Vec::new();
    push_filter(&mut sql, &mut args, "NumAtCard", filter.web_order_id.as_deref());
    push_filter(&mut sql, &mut args, "CardCode", filter.card_code.as_deref());
    sql.push_str(&format!(
        " ORDER BY DocEntry DESC LIMIT {}",
        clamp_limit(filter.limit)
    ));
    store.fetch_all(&sql, &args).await
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemFilter {
    pub code: Option<String>,
    pub whs: Option<String>,
    pub limit: Option<i64>,
}

pub async fn items(store: &dyn DocumentStore, filter: &ItemFilter) -> Result<Vec<StoreRow>> {
    let mut sql = String::from(
        "SELECT ItemCode, ItemName, ItmsGrpCod, UgpEntry, CreateDate, UpdateDate FROM OITM",
    );
    let mut args: Vec<SqlArg> = Vec::new();
    push_filter(&mut sql, &mut args, "ItemCode", filter.code.as_deref());
    if let Some(whs) = filter.whs.as_deref() {
        args.push(whs.into());
        let clause = format!(
            "ItemCode IN (SELECT ItemCode FROM OITW WHERE WhsCode = ${})",
            args.len()
        );
        sql.push_str(if args.len() == 1 { " WHERE " } else { " AND " });
        sql.push_str(&clause);
    }
    sql.push_str(&format!(" LIMIT {}", clamp_limit(filter.limit)));
    store.fetch_all(&sql, &args).await
}

pub async fn prices(store: &dyn DocumentStore, filter: &ItemFilter) -> Result<Vec<StoreRow>> {
    let mut sql = format!(
        "SELECT ItemCode, Price, Currency, Ovrwritten, Factor FROM ITM1 \
         WHERE PriceList = {SALES_PRICE_LIST}"
    );
    let mut args: Vec<SqlArg> = Vec::new();
    if let Some(code) = filter.code.as_deref() {
        args.push(code.into());
        sql.push_str(&format!(" AND ItemCode = ${}", args.len()));
    }
    if let Some(whs) = filter.whs.as_deref() {
        args.push(whs.into());
        sql.push_str(&format!(
            " AND ItemCode IN (SELECT ItemCode FROM OITW WHERE WhsCode = ${})",
            args.len()
        ));
    }
    sql.push_str(&format!(" LIMIT {}", clamp_limit(filter.limit)));
    store.fetch_all(&sql, &args).await
}

pub async fn stock(store: &dyn DocumentStore, filter: &ItemFilter) -> Result<Vec<StoreRow>> {
    let mut sql = String::from("SELECT ItemCode, WhsCode, OnHand, IsCommited FROM OITW");
    let mut args: Vec<SqlArg> = Vec::new();
    push_filter(&mut sql, &mut args, "ItemCode", filter.code.as_deref());
    push_filter(&mut sql, &mut args, "WhsCode", filter.whs.as_deref());
    sql.push_str(&format!(" LIMIT {}", clamp_limit(filter.limit)));
    store.fetch_all(&sql, &args).await
}

#[derive(Debug, Default, Deserialize)]
pub struct ShipmentFilter {
    pub web_order_id: Option<String>,
    pub card_code: Option<String>,
    pub limit: Option<i64>,
}

/// Deliveries with their line items nested under an `items` key, the shape
/// the storefront's tracking page consumes.
pub async fn shipments(
    store: &dyn DocumentStore,
    filter: &ShipmentFilter,
) -> Result<Vec<serde_json::Value>> {
    let mut sql = String::from(
        "SELECT DocEntry, DocNum, CardCode, NumAtCard, DocDate, DocTotal, DocStatus FROM ODLN",
    );
    let mut args: Vec<SqlArg> = Vec::new();
    push_filter(&mut sql, &mut args, "NumAtCard", filter.web_order_id.as_deref());
    push_filter(&mut sql, &mut args, "CardCode", filter.card_code.as_deref());
    sql.push_str(&format!(
        " ORDER BY DocEntry DESC LIMIT {}",
        clamp_limit(filter.limit)
    ));

    let mut out = Vec::new();
    for row in store.fetch_all(&sql, &args).await? {
        let doc_entry = row
            .get_i64("DocEntry")
            .ok_or_else(|| GatewayError::Store("ODLN row without DocEntry".into()))?;
        let items = store
            .fetch_all(
                "SELECT LineNum, ItemCode, Dscription, Quantity, Price, LineTotal \
                 FROM DLN1 WHERE DocEntry = $1 ORDER BY LineNum",
                &[doc_entry.into()],
            )
            .await?;
        let mut value = serde_json::to_value(&row).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.insert("items".into(), serde_json::to_value(&items).unwrap_or_default());
        }
        out.push(value);
    }
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactFilter {
    pub card_code: String,
    pub email: Option<String>,
    pub limit: Option<i64>,
}

pub async fn contacts(store: &dyn DocumentStore, filter: &ContactFilter) -> Result<Vec<StoreRow>> {
    let mut sql = String::from(
        "SELECT CntctCode, CardCode, Name, FirstName, LastName, Tel1, E_MailL FROM OCPR \
         WHERE CardCode = $1",
    );
    let mut args: Vec<SqlArg> = vec![filter.card_code.as_str().into()];
    if let Some(email) = filter.email.as_deref() {
        args.push(email.into());
        sql.push_str(&format!(" AND E_MailL = ${}", args.len()));
    }
    sql.push_str(&format!(" LIMIT {}", clamp_limit(filter.limit)));
    store.fetch_all(&sql, &args).await
}

fn push_filter(sql: &mut String, args: &mut Vec<SqlArg>, column: &str, value: Option<&str>) {
    if let Some(value) = value {
        args.push(value.into());
        sql.push_str(if args.len() == 1 { " WHERE " } else { " AND " });
        sql.push_str(&format!("{column} = ${}", args.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::ScriptedStore;

    #[tokio::test]
    async fn order_fetch_builds_parameterized_filters() {
        let store = ScriptedStore::default();
        store.queue(vec![]);
        let filter = OrderFilter {
            web_order_id: Some("WO-9".into()),
            card_code: Some("C1".into()),
            limit: Some(10),
        };
        orders(&store, &filter).await.unwrap();
        let log = store.fetch_log.lock().unwrap();
        assert!(log[0].0.contains("WHERE NumAtCard = $1 AND CardCode = $2"));
        assert!(log[0].0.ends_with("LIMIT 10"));
        assert_eq!(log[0].1, vec!["WO-9".into(), "C1".into()]);
    }

    #[tokio::test]
    async fn limits_are_clamped() {
        let store = ScriptedStore::default();
        store.queue(vec![]);
        let filter = ItemFilter {
            limit: Some(5000),
            ..ItemFilter::default()
        };
        items(&store, &filter).await.unwrap();
        let log = store.fetch_log.lock().unwrap();
        assert!(log[0].0.ends_with("LIMIT 100"));
    }

    #[tokio::test]
    async fn unknown_expense_is_not_found() {
        let store = ScriptedStore::default();
        store.queue(vec![]);
        let err = expense_code(&store, "Air freight").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }
}
