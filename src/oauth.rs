// OAuth2 authorization-code flow with offline access, plus the transport
// decorator that keeps the access token fresh.

use crate::config::OAuthConfig;
use crate::error::{AuthorizationError, TransportError};
use crate::http::{Body, Request, Response, Transport};
use crate::token::{Token, TokenStore};
use chrono::{Duration, Utc};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::cell::RefCell;
use tracing::{debug, info, warn};
use url::Url;

/// Opaque `state` sent with the consent request. The code is pasted back by
/// hand, so there is no redirect to check it against.
pub const STATE: &str = "state-token";

/// Consent page URL asking for a refresh-capable grant.
pub fn consent_url(config: &OAuthConfig) -> Url {
    let mut url = config.auth_url.clone();
    url.query_pairs_mut()
        .append_pair("access_type", "offline")
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_url)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("state", STATE);
    url
}

/// Trade a one-time authorization code for a token.
pub fn exchange_code(
    transport: &impl Transport,
    config: &OAuthConfig,
    code: &str,
) -> Result<Token, AuthorizationError> {
    info!("exchanging authorization code for a token");
    let response = post_token_request(
        transport,
        config,
        [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_url.as_str()),
        ],
    )?;
    parse_token_response(response)
}

/// Mint a new access token from `refresh_token`. The refresh token is kept
/// when the provider does not rotate it.
pub fn refresh_token(
    transport: &impl Transport,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<Token, AuthorizationError> {
    info!("refreshing access token");
    let response = post_token_request(
        transport,
        config,
        [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ],
    )?;
    let mut token = parse_token_response(response)?;
    if token.refresh_token.is_none() {
        token.refresh_token = Some(refresh_token.to_string());
    }
    Ok(token)
}

fn post_token_request<const N: usize>(
    transport: &impl Transport,
    config: &OAuthConfig,
    params: [(&str, &str); N],
) -> Result<Response, AuthorizationError> {
    let mut form: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    form.push(("client_id".into(), config.client_id.clone()));
    form.push(("client_secret".into(), config.client_secret.clone()));

    let request = Request::new(Method::POST, config.token_url.clone()).with_body(Body::Form(form));
    Ok(transport.send(request)?)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

fn parse_token_response(response: Response) -> Result<Token, AuthorizationError> {
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(TokenErrorResponse {
                error,
                error_description: Some(description),
            }) => format!("{error}: {description}"),
            Ok(TokenErrorResponse { error, .. }) => error,
            Err(_) => crate::http::error_message(&body),
        };
        return Err(AuthorizationError::Rejected { status, message });
    }

    let parsed: TokenResponse =
        serde_json::from_str(&body).map_err(AuthorizationError::MalformedResponse)?;
    Ok(Token {
        access_token: parsed.access_token,
        token_type: parsed.token_type,
        refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
        expiry: parsed
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}

/// Transport that signs every request with the current access token and
/// renews it with the refresh token when it has expired or the server
/// answers `401 Unauthorized`.
///
/// Refreshed tokens are written back to the store so the next run picks
/// them up.
pub struct AuthorizedTransport<T> {
    inner: T,
    config: OAuthConfig,
    store: Option<TokenStore>,
    token: RefCell<Token>,
}

impl<T: Transport> AuthorizedTransport<T> {
    pub fn new(inner: T, config: OAuthConfig, token: Token) -> Self {
        AuthorizedTransport {
            inner,
            config,
            store: None,
            token: RefCell::new(token),
        }
    }

    /// Persist refreshed tokens to `store`.
    pub fn with_store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    fn refresh(&self) -> Result<(), TransportError> {
        let refresh = self.token.borrow().refresh_token.clone().unwrap_or_default();
        let token = refresh_token(&self.inner, &self.config, &refresh)
            .map_err(|err| TransportError::Refresh(Box::new(err)))?;

        if let Some(store) = &self.store {
            if let Err(err) = store.save(&token) {
                warn!(error = %err, "unable to persist refreshed token");
            }
        }
        *self.token.borrow_mut() = token;
        Ok(())
    }

    fn sign(&self, mut request: Request) -> Result<Request, TransportError> {
        let value = HeaderValue::from_str(&self.token.borrow().authorization())?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(request)
    }
}

impl<T: Transport> Transport for AuthorizedTransport<T> {
    fn send(&self, request: Request) -> Result<Response, TransportError> {
        let (expired, can_refresh) = {
            let token = self.token.borrow();
            (token.is_expired(Utc::now()), token.can_refresh())
        };
        if expired && can_refresh {
            debug!("access token expired");
            self.refresh()?;
        }

        let replay = request.try_clone();
        let response = self.inner.send(self.sign(request)?)?;
        if response.status() != StatusCode::UNAUTHORIZED || !can_refresh {
            return Ok(response);
        }
        let Some(replay) = replay else {
            return Ok(response);
        };

        debug!("access token rejected, refreshing and retrying once");
        self.refresh()?;
        self.inner.send(self.sign(replay)?)
    }
}
