//! # Google Sheets Module
//!
//! [`MealSource`] backed by a single column of a Google spreadsheet, accessed
//! through the Sheets v4 REST API with service account credentials.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::FetchError;
use crate::meal_source::MealSource;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const TOKEN_LIFETIME_SECS: i64 = 3600;
// Refresh a little before the token actually expires
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// The fields of a service account key file that the client needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, FetchError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FetchError::Auth(format!("cannot read credentials {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| FetchError::Auth(format!("invalid credentials {}: {e}", path.display())))
    }
}

/// Location of the meal column
#[derive(Debug, Clone)]
pub struct SheetLocation {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub column: String,
}

impl SheetLocation {
    /// Whole-column range, e.g. `Sheet1!A:A`
    pub fn column_range(&self) -> String {
        format!("{}!{}:{}", self.sheet_name, self.column, self.column)
    }

    /// Single-cell range, e.g. `Sheet1!A12`
    pub fn cell_range(&self, row: usize) -> String {
        format!("{}!{}{}", self.sheet_name, self.column, row)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ValueUpdate<'a> {
    values: [[&'a str; 1]; 1],
}

/// First cell of every row, trimmed, with empty cells dropped
pub fn parse_meal_column(values: &[Vec<String>]) -> Vec<String> {
    values
        .iter()
        .filter_map(|row| row.first())
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

/// Spreadsheet-backed meal source
#[derive(Debug)]
pub struct SheetsClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    location: SheetLocation,
    api_base: String,
    timeout: Duration,
    token: Mutex<Option<AccessToken>>,
}

impl SheetsClient {
    pub fn new(
        key: ServiceAccountKey,
        location: SheetLocation,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        Self::with_api_base(key, location, timeout, SHEETS_API_BASE)
    }

    pub fn with_api_base(
        key: ServiceAccountKey,
        location: SheetLocation,
        timeout: Duration,
        api_base: &str,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        info!(
            spreadsheet_id = %location.spreadsheet_id,
            range = %location.column_range(),
            "Google Sheets client configured"
        );
        Ok(Self {
            http,
            key,
            location,
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout,
            token: Mutex::new(None),
        })
    }

    pub fn location(&self) -> &SheetLocation {
        &self.location
    }

    fn map_http_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Http(e)
        }
    }

    fn values_url(&self, range: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| FetchError::Malformed(format!("invalid api base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed("api base cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.location.spreadsheet_id.as_str(),
                "values",
                range,
            ]);
        Ok(url)
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, FetchError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + TOKEN_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| FetchError::Auth(format!("invalid private key: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| FetchError::Auth(format!("cannot sign assertion: {e}")))
    }

    /// Cached access token, exchanging a fresh assertion when it is missing
    /// or about to expire
    async fn access_token(&self) -> Result<String, FetchError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at > now {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("token response: {e}")))?;
        debug!(expires_in = token.expires_in, "Obtained Google access token");

        let expires_at =
            now + chrono::Duration::seconds(token.expires_in - TOKEN_EXPIRY_MARGIN_SECS);
        *cached = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    async fn read_column(&self) -> Result<Vec<Vec<String>>, FetchError> {
        let token = self.access_token().await?;
        let url = self.values_url(&self.location.column_range())?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api { status, body });
        }

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("value range: {e}")))?;
        Ok(range.values)
    }

    async fn write_cell(&self, row: usize, value: &str) -> Result<(), FetchError> {
        let token = self.access_token().await?;
        let mut url = self.values_url(&self.location.cell_range(row))?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&ValueUpdate {
                values: [[value]],
            })
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api { status, body });
        }
        Ok(())
    }

    async fn try_append(&self, name: &str) -> Result<usize, FetchError> {
        let rows = self.read_column().await?;
        let next_row = rows.len() + 1;
        self.write_cell(next_row, name).await?;
        Ok(next_row)
    }
}

impl MealSource for SheetsClient {
    async fn fetch(&self) -> Result<Vec<String>, FetchError> {
        let values = self.read_column().await.inspect_err(|e| {
            error!(error = %e, "Failed to fetch meals from Google Sheet");
        })?;

        let meals = parse_meal_column(&values);
        if meals.is_empty() {
            warn!("No meals found in sheet");
        } else {
            info!(meals = meals.len(), "Fetched meals from Google Sheet");
        }
        Ok(meals)
    }

    async fn append(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            warn!("Refusing to append a blank meal name");
            return false;
        }

        match self.try_append(name).await {
            Ok(row) => {
                info!(meal = %name, row, "Added meal to Google Sheet");
                true
            }
            Err(e) => {
                error!(meal = %name, error = %e, "Failed to add meal to Google Sheet");
                false
            }
        }
    }
}
