use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::protocol::*;
use super::{MarketApi, MarketError};
use crate::types::DeviceProfile;

/// API calls are quick; binary delivery can move ~100 MB over a slow link.
const API_TIMEOUT: Duration = Duration::from_secs(30);
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct MarketClientConfig {
    pub base_url: String,
}

pub struct HttpMarketClient {
    client: Client,
    delivery_client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    device: DeviceHandshake<'a>,
}

#[derive(Serialize)]
struct DeviceHandshake<'a> {
    codename: &'a str,
    properties: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    session_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<AppSummary>,
}

#[derive(Deserialize)]
struct DeliveryResponse {
    base: DeliveredRef,
    #[serde(default)]
    splits: Vec<DeliveredRef>,
}

#[derive(Deserialize)]
struct DeliveredRef {
    name: String,
    total_size: i64,
    url: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    unlock_url: Option<String>,
}

impl HttpMarketClient {
    pub fn new(config: &MarketClientConfig) -> Result<Self, MarketError> {
        let client = Client::builder().timeout(API_TIMEOUT).build()?;
        let delivery_client = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;
        Ok(Self {
            client,
            delivery_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn handle_response<T: DeserializeOwned>(
        resp: reqwest::blocking::Response,
    ) -> Result<T, MarketError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json()?);
        }
        Err(Self::error_from_response(status, resp))
    }

    fn error_from_response(
        status: StatusCode,
        resp: reqwest::blocking::Response,
    ) -> MarketError {
        let detail = resp
            .json::<ApiErrorBody>()
            .ok()
            .and_then(|b| b.error)
            .unwrap_or(ApiErrorDetail {
                code: String::new(),
                message: "server error (no details provided)".to_string(),
                unlock_url: None,
            });

        match detail.code.as_str() {
            "captcha-required" => MarketError::CaptchaLocked {
                url: detail.unlock_url.unwrap_or_default(),
            },
            "incompatible-device" => MarketError::Incompatible(detail.message),
            _ if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                MarketError::Auth(detail.message)
            }
            _ if status == StatusCode::NOT_FOUND => MarketError::NotFound(detail.message),
            _ => MarketError::Api {
                status: status.as_u16(),
                message: detail.message,
            },
        }
    }

    fn login(&self, request: &LoginRequest<'_>) -> Result<LoginResponse, MarketError> {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(request)
            .send()?;
        Self::handle_response(resp)
    }

    fn fetch(&self, file: &DeliveredRef) -> Result<DeliveredFile, MarketError> {
        let resp = self.delivery_client.get(&file.url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::error_from_response(status, resp));
        }
        let data = resp.bytes()?.to_vec();
        Ok(DeliveredFile {
            name: file.name.clone(),
            total_size: file.total_size,
            data,
        })
    }
}

impl MarketApi for HttpMarketClient {
    fn login_with_credentials(
        &self,
        account: &MarketAccount,
        device: &DeviceProfile,
    ) -> Result<(MarketSession, String), MarketError> {
        let resp = self.login(&LoginRequest {
            username: &account.username,
            password: Some(&account.password),
            token: None,
            device: DeviceHandshake {
                codename: &device.codename,
                properties: &device.properties,
            },
        })?;

        let refresh = resp
            .refresh_token
            .ok_or_else(|| MarketError::Auth("credential login returned no token".to_string()))?;

        Ok((
            MarketSession {
                session_token: resp.session_token,
                device_codename: device.codename.clone(),
            },
            refresh,
        ))
    }

    fn login_with_token(
        &self,
        account: &MarketAccount,
        token: &str,
        device: &DeviceProfile,
    ) -> Result<MarketSession, MarketError> {
        let resp = self.login(&LoginRequest {
            username: &account.username,
            password: None,
            token: Some(token),
            device: DeviceHandshake {
                codename: &device.codename,
                properties: &device.properties,
            },
        })?;

        Ok(MarketSession {
            session_token: resp.session_token,
            device_codename: device.codename.clone(),
        })
    }

    fn search(
        &self,
        session: &MarketSession,
        query: &str,
    ) -> Result<Vec<AppSummary>, MarketError> {
        let resp = self
            .client
            .get(self.url("/apps/search"))
            .query(&[("q", query)])
            .bearer_auth(&session.session_token)
            .send()?;
        let body: SearchResponse = Self::handle_response(resp)?;
        Ok(body.results)
    }

    fn details(
        &self,
        session: &MarketSession,
        package_id: &str,
    ) -> Result<AppDetails, MarketError> {
        let resp = self
            .client
            .get(self.url(&format!("/apps/{package_id}")))
            .bearer_auth(&session.session_token)
            .send()?;
        Self::handle_response(resp)
    }

    fn delivery(
        &self,
        session: &MarketSession,
        package_id: &str,
        version_code: i64,
        offer_type: i32,
    ) -> Result<AppDelivery, MarketError> {
        let resp = self
            .client
            .post(self.url(&format!("/apps/{package_id}/delivery")))
            .bearer_auth(&session.session_token)
            .json(&serde_json::json!({
                "version_code": version_code,
                "offer_type": offer_type,
            }))
            .send()?;
        let body: DeliveryResponse = Self::handle_response(resp)?;

        let base = self.fetch(&body.base)?;
        let splits = body
            .splits
            .iter()
            .map(|s| self.fetch(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AppDelivery { base, splits })
    }
}
