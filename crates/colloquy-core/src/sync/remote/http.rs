//! HTTP implementation of the remote record store.
//!
//! Talks to the sync service's JSON API. Per-record results of a modify
//! batch arrive as typed error codes in the response body and are mapped
//! onto [`RemoteError`] so the engine interprets HTTP and in-memory stores
//! identically.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{AccountStatus, FetchPage, ModifyOutcome, RemoteError, RemoteRecord, RemoteStore};
use crate::util::normalize_text_option;

#[derive(Clone)]
pub struct HttpRemoteStore {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    /// Build a client for the service at `endpoint`, optionally with a
    /// bearer token for authenticated deployments.
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, RemoteError> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let token = normalize_text_option(token);
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| RemoteError::Other(error.to_string()))?;
        Ok(Self {
            endpoint,
            token,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.endpoint))
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_status(status, &body))
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn account_status(&self) -> Result<AccountStatus, RemoteError> {
        let response = self
            .request(reqwest::Method::GET, "/v1/account")
            .send()
            .await
            .map_err(map_transport_error)?;
        let payload = Self::check(response)
            .await?
            .json::<AccountResponse>()
            .await
            .map_err(map_transport_error)?;
        Ok(payload.status)
    }

    async fn list_zones(&self) -> Result<Vec<String>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET, "/v1/zones")
            .send()
            .await
            .map_err(map_transport_error)?;
        let payload = Self::check(response)
            .await?
            .json::<ZoneListResponse>()
            .await
            .map_err(map_transport_error)?;
        Ok(payload.zones)
    }

    async fn create_zone(&self, zone: &str) -> Result<(), RemoteError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/v1/zones/{zone}"))
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn modify_records(
        &self,
        zone: &str,
        saves: Vec<RemoteRecord>,
        deletes: Vec<String>,
    ) -> Result<ModifyOutcome, RemoteError> {
        let body = ModifyRequest { saves, deletes };
        let response = self
            .request(reqwest::Method::POST, &format!("/v1/zones/{zone}/modify"))
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let payload = Self::check(response)
            .await?
            .json::<ModifyResponse>()
            .await
            .map_err(map_transport_error)?;

        let mut outcome = ModifyOutcome::default();
        for item in payload.saved {
            let result = match item.error {
                Some(error) => Err(error.into_remote_error()),
                None => item.record.ok_or_else(|| {
                    RemoteError::Malformed("save result missing record".to_string())
                }),
            };
            outcome.saved.push((item.name, result));
        }
        for item in payload.deleted {
            let result = match item.error {
                Some(error) => Err(error.into_remote_error()),
                None => Ok(()),
            };
            outcome.deleted.push((item.name, result));
        }
        Ok(outcome)
    }

    async fn fetch_changes(
        &self,
        zone: &str,
        cursor: Option<&str>,
    ) -> Result<FetchPage, RemoteError> {
        let mut builder = self.request(reqwest::Method::GET, &format!("/v1/zones/{zone}/changes"));
        if let Some(cursor) = cursor {
            builder = builder.query(&[("cursor", cursor)]);
        }
        let response = builder.send().await.map_err(map_transport_error)?;
        let payload = Self::check(response)
            .await?
            .json::<ChangesResponse>()
            .await
            .map_err(map_transport_error)?;

        Ok(FetchPage {
            modifications: payload.modifications,
            deletions: payload.deletions,
            zone_deletions: payload.zone_deletions,
            cursor: payload.cursor,
            more: payload.more,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    status: AccountStatus,
}

#[derive(Debug, Deserialize)]
struct ZoneListResponse {
    zones: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ModifyRequest {
    saves: Vec<RemoteRecord>,
    deletes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModifyResponse {
    #[serde(default)]
    saved: Vec<SaveResult>,
    #[serde(default)]
    deleted: Vec<DeleteResult>,
}

#[derive(Debug, Deserialize)]
struct SaveResult {
    name: String,
    record: Option<RemoteRecord>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct DeleteResult {
    name: String,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    #[serde(default)]
    modifications: Vec<RemoteRecord>,
    #[serde(default)]
    deletions: Vec<String>,
    #[serde(default)]
    zone_deletions: Vec<super::ZoneDeletionReason>,
    cursor: Option<String>,
    #[serde(default)]
    more: bool,
}

/// Typed per-record error as the service reports it.
#[derive(Debug, Deserialize)]
struct WireError {
    code: String,
    message: Option<String>,
    server_record: Option<Box<RemoteRecord>>,
}

impl WireError {
    fn into_remote_error(self) -> RemoteError {
        match self.code.as_str() {
            "network_unavailable" => RemoteError::NetworkUnavailable,
            "service_unavailable" => RemoteError::ServiceUnavailable,
            "not_authenticated" => RemoteError::NotAuthenticated,
            "zone_not_found" => RemoteError::ZoneNotFound,
            "unknown_item" => RemoteError::UnknownItem,
            "conflict" => RemoteError::Conflict {
                server: self.server_record,
            },
            "malformed" => RemoteError::Malformed(self.message.unwrap_or_default()),
            other => RemoteError::Other(
                self.message
                    .unwrap_or_else(|| format!("unrecognized error code {other}")),
            ),
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() {
        RemoteError::NetworkUnavailable
    } else {
        RemoteError::Other(error.to_string())
    }
}

fn error_from_status(status: StatusCode, body: &str) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::NotAuthenticated,
        StatusCode::NOT_FOUND => RemoteError::ZoneNotFound,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::ServiceUnavailable,
        status if status.is_server_error() => RemoteError::ServiceUnavailable,
        status => RemoteError::Other(parse_api_error(status, body)),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String, RemoteError> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| RemoteError::Other("endpoint must not be empty".to_string()))?;
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Other(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_trims_trailing_slash() {
        assert_eq!(
            normalize_endpoint("https://sync.example.com/".to_string()).unwrap(),
            "https://sync.example.com"
        );
    }

    #[test]
    fn test_normalize_endpoint_requires_scheme() {
        assert!(normalize_endpoint("sync.example.com".to_string()).is_err());
        assert!(normalize_endpoint("   ".to_string()).is_err());
    }

    #[test]
    fn test_wire_error_codes_map_to_remote_errors() {
        let conflict = WireError {
            code: "conflict".to_string(),
            message: None,
            server_record: None,
        };
        assert!(matches!(
            conflict.into_remote_error(),
            RemoteError::Conflict { server: None }
        ));

        let unknown = WireError {
            code: "unknown_item".to_string(),
            message: None,
            server_record: None,
        };
        assert_eq!(unknown.into_remote_error(), RemoteError::UnknownItem);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            error_from_status(StatusCode::UNAUTHORIZED, ""),
            RemoteError::NotAuthenticated
        );
        assert_eq!(
            error_from_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            RemoteError::ServiceUnavailable
        );
        assert_eq!(
            error_from_status(StatusCode::NOT_FOUND, ""),
            RemoteError::ZoneNotFound
        );
    }

    #[test]
    fn test_parse_api_error_prefers_json_message() {
        let body = r#"{"message": "zone quota exceeded"}"#;
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, body),
            "zone quota exceeded (400)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_REQUEST, ""), "HTTP 400");
    }
}
