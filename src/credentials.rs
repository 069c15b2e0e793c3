//! Credential resolution for Athena requests.
//!
//! A query's connection settings select static keys, a delegated role, or
//! nothing at all. "Nothing" means the caller falls back to the ambient
//! environment credentials.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::athena::signed_post;
use crate::error::{DatasourceError, Result};
use crate::query::{AuthType, QueryOption};

const STS_API_VERSION: &str = "2011-06-15";
const ROLE_SESSION_NAME: &str = "athena-datasource";
const ROLE_SESSION_SECS: u32 = 3600;

/// Assumed-role credentials are refreshed this long before they expire.
const REFRESH_MARGIN_MINS: i64 = 5;

/// An access key pair with an optional session token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Creates long-lived credentials without a session token.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Reads the ambient credentials from `AWS_ACCESS_KEY_ID`,
    /// `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        if access_key_id.is_empty() || secret_access_key.is_empty() {
            return None;
        }
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Resolves the credentials a query should be signed with.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Returns `None` when the query does not configure credentials.
    async fn resolve(&self, opt: &QueryOption) -> Result<Option<Credentials>>;
}

/// Static keys or STS role assumption, selected by the query's auth type.
pub struct DefaultCredentialsProvider {
    http: reqwest::Client,
    sts_endpoint: Option<String>,
    assumed: Mutex<HashMap<String, (Credentials, DateTime<Utc>)>>,
}

impl DefaultCredentialsProvider {
    /// Creates a provider using the regional STS endpoint.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            sts_endpoint: None,
            assumed: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the STS endpoint (useful for emulators).
    pub fn with_sts_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.sts_endpoint = Some(endpoint.into());
        self
    }

    fn sts_url(&self, region: &str) -> Result<Url> {
        let endpoint = match &self.sts_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://sts.{region}.amazonaws.com/"),
        };
        Url::parse(&endpoint)
            .map_err(|e| DatasourceError::config(format!("Invalid STS endpoint: {e}")))
    }

    fn static_credentials(opt: &QueryOption) -> Option<Credentials> {
        let conn = &opt.connection;
        if conn.access_key.is_empty() || conn.secret_key.is_empty() {
            return None;
        }
        Some(Credentials::new(&conn.access_key, &conn.secret_key))
    }

    fn cached_role(&self, role_arn: &str, now: DateTime<Utc>) -> Option<Credentials> {
        let assumed = self.assumed.lock();
        let (creds, expires_at) = assumed.get(role_arn)?;
        (*expires_at - Duration::minutes(REFRESH_MARGIN_MINS) > now).then(|| creds.clone())
    }

    async fn assume_role(&self, role_arn: &str, region: &str) -> Result<Credentials> {
        if let Some(creds) = self.cached_role(role_arn, Utc::now()) {
            debug!(role_arn, "Using cached assumed-role credentials");
            return Ok(creds);
        }

        let ambient = Credentials::from_env().ok_or_else(|| {
            DatasourceError::credentials("assuming a role requires ambient AWS credentials")
        })?;

        let url = self.sts_url(region)?;

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", "AssumeRole")
            .append_pair("Version", STS_API_VERSION)
            .append_pair("RoleArn", role_arn)
            .append_pair("RoleSessionName", ROLE_SESSION_NAME)
            .append_pair("DurationSeconds", &ROLE_SESSION_SECS.to_string())
            .finish();

        info!(role_arn, "Assuming role");
        let headers = vec![
            (
                "content-type".to_string(),
                "application/x-www-form-urlencoded; charset=utf-8".to_string(),
            ),
            ("accept".to_string(), "application/json".to_string()),
        ];
        let response = signed_post(
            &self.http,
            &url,
            region,
            "sts",
            Some(&ambient),
            headers,
            body.into_bytes(),
        )
        .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DatasourceError::credentials(format!(
                "AssumeRole failed ({status}): {text}"
            )));
        }

        let (creds, expires_at) = parse_assume_role_response(&text)?;
        self.assumed
            .lock()
            .insert(role_arn.to_string(), (creds.clone(), expires_at));
        Ok(creds)
    }
}

#[async_trait]
impl CredentialsProvider for DefaultCredentialsProvider {
    async fn resolve(&self, opt: &QueryOption) -> Result<Option<Credentials>> {
        match opt.connection.auth_type {
            AuthType::Static => Ok(Self::static_credentials(opt)),
            AuthType::RoleArn => {
                let role_arn = opt.connection.role_arn.as_str();
                if role_arn.is_empty() {
                    return Ok(None);
                }
                self.assume_role(role_arn, &opt.connection.region)
                    .await
                    .map(Some)
            }
            AuthType::Default => Ok(None),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleEnvelope {
    assume_role_response: AssumeRoleResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    assume_role_result: AssumeRoleResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: StsCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: serde_json::Value,
}

fn parse_assume_role_response(text: &str) -> Result<(Credentials, DateTime<Utc>)> {
    let envelope: AssumeRoleEnvelope = serde_json::from_str(text)
        .map_err(|e| DatasourceError::credentials(format!("Malformed AssumeRole response: {e}")))?;
    let sts = envelope.assume_role_response.assume_role_result.credentials;

    // STS reports expiration as epoch seconds in JSON, RFC 3339 elsewhere.
    let expires_at = match &sts.expiration {
        serde_json::Value::Number(n) => n
            .as_f64()
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single()),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
    .ok_or_else(|| DatasourceError::credentials("AssumeRole response has no valid expiration"))?;

    Ok((
        Credentials {
            access_key_id: sts.access_key_id,
            secret_access_key: sts.secret_access_key,
            session_token: Some(sts.session_token),
        },
        expires_at,
    ))
}
