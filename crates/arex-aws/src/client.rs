//! Signed HTTP transport shared by all AWS adapters.

use crate::error::{AwsError, Result};
use crate::sign::{canonical_query, sign_request, SignRequest};
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// A static AWS credential pair, with an optional session token for
/// temporary credentials.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN` from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`AwsError::MissingCredentials`] naming the first required
    /// variable that is unset or empty.
    pub fn from_env() -> Result<Self> {
        let access_key_id = require_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = require_env("AWS_SECRET_ACCESS_KEY")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

fn require_env(var: &'static str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(AwsError::MissingCredentials { var })
}

/// An HTTP client bound to one region, signing every request it sends.
pub struct RegionClient {
    region: String,
    credentials: Arc<AwsCredentials>,
    http: Client,
}

impl RegionClient {
    pub fn new(region: impl Into<String>, credentials: Arc<AwsCredentials>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            region: region.into(),
            credentials,
            http,
        })
    }

    /// Builds one client per region, keyed by region name.
    pub fn build_set(
        regions: &[String],
        credentials: &Arc<AwsCredentials>,
    ) -> Result<HashMap<String, RegionClient>> {
        regions
            .iter()
            .map(|region| {
                RegionClient::new(region.clone(), Arc::clone(credentials))
                    .map(|client| (region.clone(), client))
            })
            .collect()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Calls a Query-protocol action (`Action`/`Version` form body against
    /// `https://{service}.{region}.amazonaws.com/`) and returns the raw
    /// response body, which the callers deserialize as XML.
    pub async fn post_query(
        &self,
        service: &'static str,
        action: &str,
        version: &str,
        params: &[(&str, &str)],
    ) -> Result<String> {
        let host = format!("{}.{}.amazonaws.com", service, self.region);
        let mut form: Vec<(&str, &str)> = vec![("Action", action), ("Version", version)];
        form.extend_from_slice(params);
        let body = canonical_query(&form);

        tracing::debug!(service, action, region = %self.region, "Calling Query API");

        let mut headers: Vec<(&str, &str)> = vec![("content-type", FORM_CONTENT_TYPE)];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token", token));
        }
        let signature = sign_request(
            &self.credentials,
            &SignRequest {
                method: "POST",
                host: &host,
                uri: "/",
                query: "",
                service,
                region: &self.region,
                headers: &headers,
                payload: body.as_bytes(),
                timestamp: Utc::now(),
            },
        )?;

        let mut request = self
            .http
            .post(format!("https://{host}/"))
            .header("Content-Type", FORM_CONTENT_TYPE)
            .header("X-Amz-Date", &signature.amz_date)
            .header("Authorization", &signature.authorization)
            .body(body);
        if let Some(token) = &self.credentials.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        read_response(service, request.send().await?).await
    }

    /// Calls a JSON 1.1 action addressed by its `X-Amz-Target` header and
    /// returns the raw response body.
    pub async fn post_json(
        &self,
        service: &'static str,
        target: &str,
        payload: &serde_json::Value,
    ) -> Result<String> {
        let host = format!("{}.{}.amazonaws.com", service, self.region);
        let body = serde_json::to_vec(payload)?;

        tracing::debug!(service, target, region = %self.region, "Calling JSON API");

        let mut headers: Vec<(&str, &str)> =
            vec![("content-type", JSON_CONTENT_TYPE), ("x-amz-target", target)];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token", token));
        }
        let signature = sign_request(
            &self.credentials,
            &SignRequest {
                method: "POST",
                host: &host,
                uri: "/",
                query: "",
                service,
                region: &self.region,
                headers: &headers,
                payload: &body,
                timestamp: Utc::now(),
            },
        )?;

        let mut request = self
            .http
            .post(format!("https://{host}/"))
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("X-Amz-Target", target)
            .header("X-Amz-Date", &signature.amz_date)
            .header("Authorization", &signature.authorization)
            .body(body);
        if let Some(token) = &self.credentials.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        read_response(service, request.send().await?).await
    }

    /// Sends a signed GET against an explicit host, for REST-style services
    /// that do not follow the regional host scheme. `path` must already be
    /// percent-encoded and `query` must be in canonical form.
    pub async fn get_rest(
        &self,
        service: &'static str,
        host: &str,
        path: &str,
        query: &str,
    ) -> Result<String> {
        tracing::debug!(service, path, region = %self.region, "Calling REST API");

        let mut headers: Vec<(&str, &str)> = Vec::new();
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token", token));
        }
        let signature = sign_request(
            &self.credentials,
            &SignRequest {
                method: "GET",
                host,
                uri: path,
                query,
                service,
                region: &self.region,
                headers: &headers,
                payload: b"",
                timestamp: Utc::now(),
            },
        )?;

        let mut url = format!("https://{host}{path}");
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        let mut request = self
            .http
            .get(url)
            .header("X-Amz-Date", &signature.amz_date)
            .header("Authorization", &signature.authorization);
        if let Some(token) = &self.credentials.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        read_response(service, request.send().await?).await
    }
}

async fn read_response(service: &'static str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AwsError::Http {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
