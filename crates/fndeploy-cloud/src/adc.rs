//! Application Default Credentials files.
//!
//! `GOOGLE_APPLICATION_CREDENTIALS` names a JSON file of one of three types:
//!
//! - `service_account`: a key file. A self-signed JWT scoped to
//!   `cloud-platform` is used directly as the bearer token, so no token
//!   endpoint is involved.
//! - `authorized_user`: a refresh token exchanged at the OAuth2 endpoint.
//! - `external_account`: workload identity federation. The subject token is
//!   read from a file or URL, exchanged at the security token service, and
//!   optionally traded for a service account token via impersonation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, TokenProvider};
use crate::http::{HttpExecutor, HttpRequest, Method, ReqwestExecutor};

pub const CREDENTIALS_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const OAUTH2_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const JWT_LIFETIME_SECS: u64 = 3600;

// ── File format ──

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
    ExternalAccount(ExternalAccount),
}

impl CredentialsFile {
    pub async fn load(path: &Path) -> Result<Self, AuthError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| AuthError::ReadCredentials {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        serde_json::from_str(&content).map_err(|e| AuthError::ParseCredentials {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            CredentialsFile::ServiceAccount(_) => "service_account",
            CredentialsFile::AuthorizedUser(_) => "authorized_user",
            CredentialsFile::ExternalAccount(_) => "external_account",
        }
    }
}

#[derive(Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .finish()
    }
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    iat: u64,
    exp: u64,
}

impl ServiceAccountKey {
    /// An RS256 JWT issued at `now` (seconds since the epoch), valid for an hour.
    pub fn self_signed_jwt(&self, now: u64) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let claims = JwtClaims {
            iss: &self.client_email,
            sub: &self.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            iat: now,
            exp: now + JWT_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| AuthError::SignJwt { source: e })?;
        jsonwebtoken::encode(&header, &claims, &key).map_err(|e| AuthError::SignJwt { source: e })
    }
}

#[derive(Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct ExternalAccount {
    pub audience: String,
    pub subject_token_type: String,
    pub token_url: String,
    #[serde(default)]
    pub service_account_impersonation_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub credential_source: CredentialSource,
}

impl ExternalAccount {
    fn scope(&self) -> String {
        if self.scopes.is_empty() {
            CLOUD_PLATFORM_SCOPE.to_owned()
        } else {
            self.scopes.join(" ")
        }
    }
}

/// Where an external account reads its subject token. Exactly one of
/// `file` or `url` is expected.
#[derive(Debug, Deserialize)]
pub struct CredentialSource {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub format: Option<SourceFormat>,
}

/// `text` (the whole body) or `json` (one string field of the body).
#[derive(Debug, Deserialize)]
pub struct SourceFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(default)]
    pub subject_token_field_name: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImpersonatedToken {
    access_token: String,
}

// ── Provider ──

/// Reads the credentials file named by [`CREDENTIALS_ENV_VAR`].
///
/// Without a path the provider has no credentials. A path that is set but
/// unreadable or malformed is an error rather than a fallthrough.
pub struct AdcFileProvider<H: HttpExecutor = ReqwestExecutor> {
    path: Option<PathBuf>,
    http: H,
}

impl AdcFileProvider<ReqwestExecutor> {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self::with_http(path, ReqwestExecutor::new())
    }

    pub fn from_env() -> Self {
        let path = std::env::var_os(CREDENTIALS_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::new(path)
    }
}

impl<H: HttpExecutor> AdcFileProvider<H> {
    pub fn with_http(path: Option<PathBuf>, http: H) -> Self {
        Self { path, http }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn refresh_user_token(&self, user: &AuthorizedUser) -> Result<String, AuthError> {
        let response: TokenResponse = self
            .post_form(
                OAUTH2_TOKEN_URL,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", user.client_id.as_str()),
                    ("client_secret", user.client_secret.as_str()),
                    ("refresh_token", user.refresh_token.as_str()),
                ],
            )
            .await?;
        Ok(response.access_token)
    }

    async fn exchange_external_token(&self, account: &ExternalAccount) -> Result<String, AuthError> {
        let subject_token = self.subject_token(&account.credential_source).await?;
        let scope = account.scope();

        let sts: TokenResponse = self
            .post_form(
                &account.token_url,
                &[
                    ("grant_type", TOKEN_EXCHANGE_GRANT_TYPE),
                    ("audience", account.audience.as_str()),
                    ("scope", scope.as_str()),
                    ("requested_token_type", ACCESS_TOKEN_TYPE),
                    ("subject_token_type", account.subject_token_type.as_str()),
                    ("subject_token", subject_token.as_str()),
                ],
            )
            .await?;

        let Some(url) = &account.service_account_impersonation_url else {
            return Ok(sts.access_token);
        };

        tracing::debug!(url = %url, "impersonating service account");
        let body = serde_json::json!({ "scope": scope.split(' ').collect::<Vec<_>>() });
        let request = HttpRequest::new(Method::Post, url.as_str())
            .header("authorization", format!("Bearer {}", sts.access_token))
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .body(body.to_string().into_bytes());
        let impersonated: ImpersonatedToken = self.send_json(request).await?;
        Ok(impersonated.access_token)
    }

    async fn subject_token(&self, source: &CredentialSource) -> Result<String, AuthError> {
        let raw = match (&source.file, &source.url) {
            (Some(file), _) => {
                tokio::fs::read_to_string(file)
                    .await
                    .map_err(|e| AuthError::ReadCredentials {
                        path: file.clone(),
                        source: e,
                    })?
            }
            (None, Some(url)) => {
                let mut request = HttpRequest::new(Method::Get, url.as_str());
                for (name, value) in &source.headers {
                    request = request.header(name, value.as_str());
                }
                let url = request.url.clone();
                let response = self
                    .http
                    .execute(request)
                    .await
                    .map_err(|e| AuthError::TokenRequest { source: e })?;
                if !response.is_success() {
                    return Err(AuthError::TokenEndpoint {
                        url,
                        status: response.status,
                        body: response.body,
                    });
                }
                response.body
            }
            (None, None) => {
                return Err(AuthError::SubjectToken {
                    detail: "credential_source must name a file or a url".to_owned(),
                });
            }
        };

        match &source.format {
            Some(format) if format.format_type == "json" => {
                let field = format.subject_token_field_name.as_deref().unwrap_or("");
                let value: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|e| AuthError::SubjectToken {
                        detail: format!("subject token is not JSON: {e}"),
                    })?;
                value
                    .get(field)
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| AuthError::SubjectToken {
                        detail: format!("subject token field '{field}' is missing or not a string"),
                    })
            }
            _ => Ok(raw.trim().to_owned()),
        }
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AuthError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        let request = HttpRequest::new(Method::Post, url)
            .header("content-type", "application/x-www-form-urlencoded")
            .header("accept", "application/json")
            .body(body.into_bytes());
        self.send_json(request).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, AuthError> {
        let url = request.url.clone();
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| AuthError::TokenRequest { source: e })?;
        if !response.is_success() {
            return Err(AuthError::TokenEndpoint {
                url,
                status: response.status,
                body: response.body,
            });
        }
        serde_json::from_str(&response.body).map_err(|e| AuthError::TokenResponse { url, source: e })
    }
}

impl<H: HttpExecutor> TokenProvider for AdcFileProvider<H> {
    async fn access_token(&self) -> Result<Option<String>, AuthError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let credentials = CredentialsFile::load(path).await?;
        tracing::debug!(
            path = %path.display(),
            kind = credentials.kind(),
            "using application default credentials"
        );

        let token = match &credentials {
            CredentialsFile::ServiceAccount(key) => key.self_signed_jwt(unix_now()?)?,
            CredentialsFile::AuthorizedUser(user) => self.refresh_user_token(user).await?,
            CredentialsFile::ExternalAccount(account) => {
                self.exchange_external_token(account).await?
            }
        };
        Ok(Some(token))
    }
}

fn unix_now() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::Clock { source: e })
}
