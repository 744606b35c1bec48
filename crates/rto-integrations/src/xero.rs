//! Xero fixed-asset register.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{IntegrationError, IntegrationResult};
use crate::http::{HttpAuth, HttpClient, HttpClientConfig, RateLimitConfig};
use crate::traits::{AssetSource, ExternalAsset};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XeroConfig {
    pub tenant_id: String,
    pub access_token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://api.xero.com/assets.xro/1.0".to_string()
}

impl XeroConfig {
    pub fn new(tenant_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            access_token: access_token.into(),
            base_url: default_base_url(),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.tenant_id.is_empty() {
            problems.push("xero.tenant_id is empty".to_string());
        }
        if self.access_token.is_empty() {
            problems.push("xero.access_token is empty".to_string());
        }
        problems
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetPage {
    pagination: Pagination,
    #[serde(default)]
    items: Vec<XeroAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: u32,
    page_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XeroAsset {
    asset_id: String,
    asset_name: String,
    asset_number: String,
    #[serde(default)]
    purchase_date: Option<String>,
    #[serde(default)]
    purchase_price: Option<f64>,
    #[serde(default)]
    asset_status: Option<String>,
}

/// Xero dates look like `2023-07-01T00:00:00`.
fn parse_xero_date(value: &str) -> Option<NaiveDate> {
    value
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

impl From<XeroAsset> for ExternalAsset {
    fn from(asset: XeroAsset) -> Self {
        ExternalAsset {
            external_id: asset.asset_id,
            asset_number: asset.asset_number,
            name: asset.asset_name,
            purchase_date: asset.purchase_date.as_deref().and_then(parse_xero_date),
            purchase_price: asset.purchase_price,
            status: asset.asset_status.unwrap_or_else(|| "Registered".to_string()),
        }
    }
}

pub struct XeroClient {
    http: HttpClient,
}

impl XeroClient {
    pub fn new(config: XeroConfig) -> IntegrationResult<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(IntegrationError::NotConfigured(problems.join("; ")));
        }

        let http_config = HttpClientConfig::new("xero", config.base_url)
            .with_auth(HttpAuth::Bearer(config.access_token))
            .with_header("xero-tenant-id", config.tenant_id)
            .with_header("accept", "application/json");

        // Xero allows 60 calls a minute per tenant.
        let http = HttpClient::with_rate_limit(http_config, Some(RateLimitConfig::default()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl AssetSource for XeroClient {
    fn name(&self) -> &str {
        "xero"
    }

    /// Fetches every registered asset, following pagination.
    #[instrument(skip(self))]
    async fn list_assets(&self) -> IntegrationResult<Vec<ExternalAsset>> {
        let mut assets = Vec::new();
        let mut page = 1;

        loop {
            let path = format!("/Assets?status=REGISTERED&page={}&pageSize=100", page);
            let body: AssetPage = self.http.get_json(&path).await?;
            debug!(page, count = body.items.len(), "Fetched Xero asset page");

            assets.extend(body.items.into_iter().map(ExternalAsset::from));
            if body.pagination.page >= body.pagination.page_count {
                break;
            }
            page = body.pagination.page + 1;
        }

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_parse_dates() {
        assert_eq!(
            parse_xero_date("2023-07-01T00:00:00"),
            NaiveDate::from_ymd_opt(2023, 7, 1)
        );
        assert_eq!(parse_xero_date("bad"), None);
    }

    #[test]
    fn test_requires_tenant() {
        let err = XeroClient::new(XeroConfig::new("", "token")).err().unwrap();
        assert!(matches!(err, IntegrationError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/Assets")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .match_header("xero-tenant-id", "tenant-1")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"pagination":{"page":1,"pageSize":100,"pageCount":2,"itemCount":2},
                    "items":[{"assetId":"a1","assetName":"Laptop","assetNumber":"FA-0001",
                              "purchaseDate":"2023-07-01T00:00:00","purchasePrice":1999.0,
                              "assetStatus":"Registered"}]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/Assets")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"pagination":{"page":2,"pageSize":100,"pageCount":2,"itemCount":2},
                    "items":[{"assetId":"a2","assetName":"Projector","assetNumber":"FA-0002"}]}"#,
            )
            .create_async()
            .await;

        let mut config = XeroConfig::new("tenant-1", "tok");
        config.base_url = server.url();
        let assets = XeroClient::new(config).unwrap().list_assets().await.unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].asset_number, "FA-0001");
        assert_eq!(assets[0].purchase_date, NaiveDate::from_ymd_opt(2023, 7, 1));
        assert_eq!(assets[1].name, "Projector");
        assert_eq!(assets[1].status, "Registered");
    }
}
