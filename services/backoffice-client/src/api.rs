//! Typed callers for the back-office REST API
//!
//! Each caller builds an `OutboundRequest` and sends it through the
//! authenticated client, so token expiry never reaches this layer. Response
//! bodies are opaque JSON.

use backoffice_auth::error_message;
use backoffice_session::AuthenticatedClient;
use serde::Serialize;
use serde_json::Value;
use transport::{OutboundRequest, TransportResponse};

use crate::error::Error;

/// Status name the backend uses for overdue transactions
pub const OVERDUE_STATUS: &str = "Quá hạn";

/// Paging and search parameters shared by the transaction listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub page: u32,
    pub limit: u32,
    pub search: String,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TransactionUpdate<'a> {
    status: &'a str,
    note: &'a str,
}

fn paged(request: OutboundRequest, query: &TransactionQuery) -> OutboundRequest {
    request
        .query("page", query.page)
        .query("limit", query.limit)
        .query("search", &query.search)
}

pub fn list_transactions_request(query: &TransactionQuery) -> OutboundRequest {
    paged(OutboundRequest::get("/transactions"), query)
}

/// The status becomes a path segment; the transport percent-encodes it.
pub fn transactions_by_status_request(status: &str, query: &TransactionQuery) -> OutboundRequest {
    paged(
        OutboundRequest::get(format!("/transactions/status/{status}")),
        query,
    )
}

pub fn transaction_request(id: u64) -> OutboundRequest {
    OutboundRequest::get(format!("/transactions/{id}"))
}

pub fn update_transaction_request(
    id: u64,
    status: &str,
    note: &str,
) -> transport::Result<OutboundRequest> {
    OutboundRequest::put(format!("/transactions/{id}")).json(&TransactionUpdate { status, note })
}

/// Decode a response body, turning non-2xx statuses into `Error::Api`.
///
/// Empty bodies decode to `null`; non-JSON bodies to a string.
pub fn into_json(response: TransportResponse) -> Result<Value, Error> {
    let text = response.text();
    if !response.is_success() {
        return Err(Error::Api {
            status: response.status.as_u16(),
            message: error_message(&text),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

async fn fetch(client: &AuthenticatedClient, request: OutboundRequest) -> anyhow::Result<Value> {
    let response = client.send(request).await?;
    Ok(into_json(response)?)
}

pub async fn list_transactions(
    client: &AuthenticatedClient,
    query: &TransactionQuery,
) -> anyhow::Result<Value> {
    fetch(client, list_transactions_request(query)).await
}

pub async fn transactions_by_status(
    client: &AuthenticatedClient,
    status: &str,
    query: &TransactionQuery,
) -> anyhow::Result<Value> {
    fetch(client, transactions_by_status_request(status, query)).await
}

pub async fn overdue_transactions(
    client: &AuthenticatedClient,
    query: &TransactionQuery,
) -> anyhow::Result<Value> {
    transactions_by_status(client, OVERDUE_STATUS, query).await
}

pub async fn transaction(client: &AuthenticatedClient, id: u64) -> anyhow::Result<Value> {
    fetch(client, transaction_request(id)).await
}

pub async fn update_transaction(
    client: &AuthenticatedClient,
    id: u64,
    status: &str,
    note: &str,
) -> anyhow::Result<Value> {
    fetch(client, update_transaction_request(id, status, note)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::{Method, StatusCode};

    #[test]
    fn list_request_carries_paging() {
        let request = list_transactions_request(&TransactionQuery {
            page: 2,
            limit: 20,
            search: "LC01".into(),
        });
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/transactions");
        assert_eq!(
            request.query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("limit".to_string(), "20".to_string()),
                ("search".to_string(), "LC01".to_string()),
            ]
        );
    }

    #[test]
    fn status_request_puts_status_in_path() {
        let request = transactions_by_status_request(OVERDUE_STATUS, &TransactionQuery::default());
        assert_eq!(request.path, "/transactions/status/Quá hạn");
        assert_eq!(request.query[0], ("page".to_string(), "1".to_string()));
        assert_eq!(request.query[2], ("search".to_string(), String::new()));
    }

    #[test]
    fn update_request_sends_status_and_note() {
        let request = update_transaction_request(7, "Đã xử lý", "called customer").unwrap();
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.path, "/transactions/7");
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"status": "Đã xử lý", "note": "called customer"})
        );
    }

    #[test]
    fn into_json_decodes_success_bodies() {
        let ok = TransportResponse::new(StatusCode::OK, r#"{"data":[],"total":0}"#);
        assert_eq!(into_json(ok).unwrap()["total"], 0);

        let empty = TransportResponse::new(StatusCode::NO_CONTENT, "");
        assert_eq!(into_json(empty).unwrap(), Value::Null);

        let plain = TransportResponse::new(StatusCode::OK, "uploaded");
        assert_eq!(into_json(plain).unwrap(), Value::String("uploaded".into()));
    }

    #[test]
    fn into_json_surfaces_backend_message() {
        let response = TransportResponse::new(
            StatusCode::FORBIDDEN,
            r#"{"message":"Forbidden resource","statusCode":403}"#,
        );
        match into_json(response) {
            Err(Error::Api { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Forbidden resource");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
