//! Google OAuth and Docs.
//!
//! Tokens live in the credential store keyed by Slack user id. An expired
//! access token is refreshed on first use and the refreshed grant is written
//! back before the document call goes out.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use pillar_core::config::GoogleConfig;
use pillar_core::domain::credential::OAuthToken;
use pillar_db::repositories::CredentialRepository;

use crate::error::{read_json, IntegrationError};

const SERVICE: &str = "google";
const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/drive.file",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub docs_base_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            docs_base_url: "https://docs.googleapis.com".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedDocument {
    pub document_id: String,
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Consent screen link; `state` carries the Slack user id back to the
    /// callback.
    fn authorization_url(&self, user_id: &str) -> String;

    async fn is_authenticated(&self, user_id: &str) -> Result<bool, IntegrationError>;

    async fn exchange_code(&self, user_id: &str, code: &str) -> Result<(), IntegrationError>;

    async fn create_document(
        &self,
        user_id: &str,
        title: &str,
        content: &str,
    ) -> Result<CreatedDocument, IntegrationError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, user_id: &str, previous_refresh: Option<String>, now: DateTime<Utc>) -> OAuthToken {
        OAuthToken {
            user_id: user_id.to_string(),
            access_token: self.access_token,
            // Refresh responses usually omit the refresh token; keep the old one.
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self.expires_in.map(|secs| now + chrono::Duration::seconds(secs)),
        }
    }
}

pub struct GoogleDocsClient {
    http: Client,
    endpoints: GoogleEndpoints,
    client_id: String,
    client_secret: SecretString,
    redirect_url: String,
    credentials: Arc<dyn CredentialRepository>,
}

impl GoogleDocsClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        redirect_url: impl Into<String>,
        credentials: Arc<dyn CredentialRepository>,
    ) -> Result<Self, IntegrationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| IntegrationError::http(SERVICE, error))?;
        Ok(Self {
            http,
            endpoints: GoogleEndpoints::default(),
            client_id: client_id.into(),
            client_secret,
            redirect_url: redirect_url.into(),
            credentials,
        })
    }

    /// `None` unless both halves of the OAuth client are configured.
    pub fn from_config(
        config: &GoogleConfig,
        credentials: Arc<dyn CredentialRepository>,
    ) -> Result<Option<Self>, IntegrationError> {
        match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => {
                Self::new(id, secret.clone(), &config.redirect_url, credentials).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, IntegrationError> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(form)
            .send()
            .await
            .map_err(|error| IntegrationError::http(SERVICE, error))?;
        let body = read_json(SERVICE, response).await?;
        let token: TokenResponse = serde_json::from_value(body).map_err(|error| {
            IntegrationError::Decode { service: SERVICE, message: error.to_string() }
        })?;
        if token.access_token.is_empty() {
            return Err(IntegrationError::Decode {
                service: SERVICE,
                message: "token endpoint returned an empty access token".to_string(),
            });
        }
        Ok(token)
    }

    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, IntegrationError> {
        let refresh_token = token.refresh_token.clone().unwrap_or_default();
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .await?;

        let refreshed = response.into_token(&token.user_id, token.refresh_token.clone(), Utc::now());
        self.credentials.save_token(refreshed.clone()).await?;
        info!(user_id = %token.user_id, "refreshed google access token");
        Ok(refreshed)
    }

    /// A usable access token, refreshing and persisting it when expired.
    async fn access_token(&self, user_id: &str) -> Result<String, IntegrationError> {
        let not_authenticated = || IntegrationError::NotAuthenticated { user_id: user_id.to_string() };
        let token = self.credentials.find_token(user_id).await?.ok_or_else(not_authenticated)?;

        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token);
        }
        if !token.can_refresh() {
            return Err(not_authenticated());
        }
        Ok(self.refresh(&token).await?.access_token)
    }
}

#[async_trait]
impl DocumentService for GoogleDocsClient {
    fn authorization_url(&self, user_id: &str) -> String {
        let scope = SCOPES.join(" ");
        format!(
            "{authorize}?response_type=code&client_id={client}&redirect_uri={redirect}&scope={scope}\
             &access_type=offline&include_granted_scopes=true&prompt=consent&state={state}",
            authorize = self.endpoints.authorize_url,
            client = urlencoding::encode(&self.client_id),
            redirect = urlencoding::encode(&self.redirect_url),
            scope = urlencoding::encode(&scope),
            state = urlencoding::encode(user_id),
        )
    }

    async fn is_authenticated(&self, user_id: &str) -> Result<bool, IntegrationError> {
        match self.access_token(user_id).await {
            Ok(_) => Ok(true),
            Err(IntegrationError::NotAuthenticated { .. }) => Ok(false),
            Err(error) => {
                warn!(user_id, error = %error, "google credential check failed");
                Ok(false)
            }
        }
    }

    async fn exchange_code(&self, user_id: &str, code: &str) -> Result<(), IntegrationError> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", self.client_secret.expose_secret()),
                ("redirect_uri", &self.redirect_url),
            ])
            .await?;

        self.credentials.save_token(response.into_token(user_id, None, Utc::now())).await?;
        info!(user_id, "stored google credentials");
        Ok(())
    }

    async fn create_document(
        &self,
        user_id: &str,
        title: &str,
        content: &str,
    ) -> Result<CreatedDocument, IntegrationError> {
        let access_token = self.access_token(user_id).await?;
        let documents_url = format!("{}/v1/documents", self.endpoints.docs_base_url);

        let response = self
            .http
            .post(&documents_url)
            .bearer_auth(&access_token)
            .json(&json!({ "title": title }))
            .send()
            .await
            .map_err(|error| IntegrationError::http(SERVICE, error))?;
        let created = read_json(SERVICE, response).await?;
        let document_id = created["documentId"]
            .as_str()
            .ok_or_else(|| IntegrationError::Decode {
                service: SERVICE,
                message: "documents.create response has no documentId".to_string(),
            })?
            .to_string();

        let requests = json!({
            "requests": [{ "insertText": { "location": { "index": 1 }, "text": content } }]
        });
        let response = self
            .http
            .post(format!("{documents_url}/{document_id}:batchUpdate"))
            .bearer_auth(&access_token)
            .json(&requests)
            .send()
            .await
            .map_err(|error| IntegrationError::http(SERVICE, error))?;
        read_json(SERVICE, response).await?;

        info!(user_id, document_id = %document_id, "created google document");
        Ok(CreatedDocument {
            url: format!("https://docs.google.com/document/d/{document_id}/edit"),
            document_id,
            title: title.to_string(),
        })
    }
}
