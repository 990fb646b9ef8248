use std::time::Duration;

use hawker_core::models::listings::Location;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Typed client for the upstream proxy marketplace: JSON over HTTPS,
/// bearer auth, `page`/`page_size` pagination. All mapping into the engine
/// error taxonomy happens here (transport failures and 5xx become
/// `Unavailable`, 4xx refusals become `Rejected`), so nothing above this
/// boundary ever sees a raw network error.
pub struct ProviderClient {
    http: Client,
    base_url: String,
    token: String,
}

/// One unit of supply as advertised upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderItem {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    pub price: Decimal,
    /// 1 = online, 0 = offline.
    pub status: u8,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    items: Vec<ProviderItem>,
    total: u64,
}

/// What a successful buy hands back. These credentials, not the advertised
/// ones, are what the lease snapshots.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchasedCredentials {
    pub order_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: u8,
}

#[derive(Debug, Deserialize)]
struct EligibleResponse {
    eligible: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Online,
    Offline,
}

impl ProviderClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        let base_url = base_url.into();

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Currently purchasable proxies, one page at a time. The returned
    /// total is a hint only; callers stop on a short page regardless.
    pub async fn list(
        &self,
        filter: &Location,
        page: u32,
        page_size: i64,
    ) -> Result<(Vec<ProviderItem>, u64)> {
        let mut req = self
            .http
            .get(format!("{}/v1/proxies", self.base_url))
            .bearer_auth(&self.token)
            .query(&[
                ("page", page.to_string()),
                ("page_size", page_size.to_string()),
            ]);
        if let Some(country) = &filter.country {
            req = req.query(&[("country", country)]);
        }
        if let Some(region) = &filter.region {
            req = req.query(&[("region", region)]);
        }
        if let Some(city) = &filter.city {
            req = req.query(&[("city", city)]);
        }
        if let Some(zip) = &filter.zip {
            req = req.query(&[("zip", zip)]);
        }

        let resp = req.send().await.map_err(transport)?;
        let body: ListResponse = decode(resp).await?;
        Ok((body.items, body.total))
    }

    pub async fn buy(&self, external_id: &str) -> Result<PurchasedCredentials> {
        let resp = self
            .http
            .post(format!("{}/v1/proxies/{}/buy", self.base_url, external_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }

    pub async fn refund_eligible(&self, order_id: &str) -> Result<bool> {
        let resp = self
            .http
            .get(format!(
                "{}/v1/orders/{}/refundable",
                self.base_url, order_id
            ))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        let body: EligibleResponse = decode(resp).await?;
        Ok(body.eligible)
    }

    pub async fn refund(&self, order_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/v1/orders/{}/refund", self.base_url, order_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        reject_on_status(resp).await?;
        Ok(())
    }

    pub async fn lookup(&self, external_id: &str) -> Result<ProviderStatus> {
        let resp = self
            .http
            .get(format!("{}/v1/proxies/{}", self.base_url, external_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        let body: LookupResponse = decode(resp).await?;

        Ok(if body.status == 1 {
            ProviderStatus::Online
        } else {
            ProviderStatus::Offline
        })
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::Unavailable(e.to_string())
}

/// 4xx means the provider understood the request and said no; that must
/// not be retried. Anything 5xx is treated as transient.
async fn reject_on_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_client_error() {
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.to_string(),
        };
        return Err(Error::Rejected(message));
    }
    if status.is_server_error() {
        return Err(Error::Unavailable(status.to_string()));
    }

    Ok(resp)
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = reject_on_status(resp).await?;
    resp.json().await.map_err(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> ProviderClient {
        ProviderClient::new(uri, "test-token", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_list_maps_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/proxies"))
            .and(query_param("page", "0"))
            .and(query_param("page_size", "2"))
            .and(query_param("country", "US"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "ext-77",
                    "host": "5.6.7.8",
                    "port": 1080,
                    "username": "u",
                    "password": "p",
                    "country": "US",
                    "price": "2.50",
                    "status": 1
                }],
                "total": 1
            })))
            .mount(&server)
            .await;

        let (items, total) = client(&server.uri())
            .list(&Location::country("US"), 0, 2)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "ext-77");
        assert_eq!(items[0].port, 1080);
        assert_eq!(items[0].price, Decimal::new(250, 2));
        assert_eq!(items[0].status, 1);
    }

    #[tokio::test]
    async fn test_buy_refusal_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/proxies/ext-1/buy"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "message": "insufficient upstream balance"
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri()).buy("ext-1").await.unwrap_err();
        match err {
            Error::Rejected(msg) => assert_eq!(msg, "insufficient upstream balance"),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/proxies"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .list(&Location::default(), 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_unavailable() {
        // nothing listens on the discard port
        let err = client("http://127.0.0.1:9")
            .list(&Location::default(), 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_lookup_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/proxies/ext-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 0 })))
            .mount(&server)
            .await;

        let status = client(&server.uri()).lookup("ext-2").await.unwrap();
        assert_eq!(status, ProviderStatus::Offline);
    }

    #[tokio::test]
    async fn test_refund_eligibility() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/orders/ord-9/refundable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "eligible": true })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/orders/ord-9/refund"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        assert!(client.refund_eligible("ord-9").await.unwrap());
        client.refund("ord-9").await.unwrap();
    }
}
