// Credential manager: turns the client registration plus whatever is in the
// token cache into an authenticated transport, running the interactive
// consent flow when the cache cannot be used.

use crate::config::{OAuthConfig, SecretDir, DRIVE_SCOPE};
use crate::error::{AuthorizationError, ConfigError};
use crate::http::Transport;
use crate::oauth::{self, AuthorizedTransport};
use crate::token::{Token, TokenStore};
use crate::ui::{self, CodePrompt};
use tracing::{info, warn};

pub struct CredentialManager {
    config: OAuthConfig,
    store: TokenStore,
}

impl CredentialManager {
    pub fn new(config: OAuthConfig, store: TokenStore) -> Self {
        CredentialManager { config, store }
    }

    /// Read `credentials.json` from `dir` and cache tokens next to it.
    pub fn from_secret_dir(dir: &SecretDir) -> Result<Self, ConfigError> {
        let config = OAuthConfig::load(&dir.credentials_path(), &[DRIVE_SCOPE])?;
        Ok(Self::new(config, TokenStore::new(dir.token_path())))
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Wrap `transport` so every request carries a valid access token.
    ///
    /// A cached token is used as is, even when stale; the returned transport
    /// refreshes it on first use. Only when the cache is missing or
    /// unreadable is the operator asked for consent, and the new token is
    /// cached. Failing to cache it is not fatal.
    pub fn authenticated_client<T: Transport>(
        &self,
        transport: T,
        prompt: &dyn CodePrompt,
    ) -> Result<AuthorizedTransport<T>, AuthorizationError> {
        let token = match self.store.load() {
            Ok(token) => token,
            Err(err) => {
                info!(reason = %err, "no usable cached token, starting authorization");
                let token = self.authorize(&transport, prompt)?;
                println!("Saving credential file to: {}", self.store.path().display());
                if let Err(err) = self.store.save(&token) {
                    warn!(error = %err, "unable to cache oauth token");
                }
                token
            }
        };

        Ok(AuthorizedTransport::new(transport, self.config.clone(), token)
            .with_store(self.store.clone()))
    }

    /// Full consent round trip: show the URL, read the code, exchange it.
    fn authorize<T: Transport>(
        &self,
        transport: &T,
        prompt: &dyn CodePrompt,
    ) -> Result<Token, AuthorizationError> {
        let url = oauth::consent_url(&self.config);
        let code = prompt
            .prompt_for_code(&url)
            .map_err(AuthorizationError::Prompt)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthorizationError::EmptyCode);
        }
        ui::with_spinner("Retrieving token...", || {
            oauth::exchange_code(transport, &self.config, code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeTransport;
    use crate::http::Request;
    use chrono::{Duration, Utc};
    use reqwest::StatusCode;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::io;
    use url::Url;

    /// Hands out a fixed code and counts how often it was asked.
    struct ScriptedPrompt {
        code: &'static str,
        calls: Cell<usize>,
        seen_url: RefCell<Option<Url>>,
    }

    impl ScriptedPrompt {
        fn new(code: &'static str) -> Self {
            ScriptedPrompt {
                code,
                calls: Cell::new(0),
                seen_url: RefCell::new(None),
            }
        }
    }

    impl CodePrompt for ScriptedPrompt {
        fn prompt_for_code(&self, consent_url: &Url) -> io::Result<String> {
            self.calls.set(self.calls.get() + 1);
            *self.seen_url.borrow_mut() = Some(consent_url.clone());
            Ok(self.code.to_string())
        }
    }

    struct FailingPrompt;

    impl CodePrompt for FailingPrompt {
        fn prompt_for_code(&self, _: &Url) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"))
        }
    }

    fn manager(dir: &std::path::Path) -> CredentialManager {
        let config = OAuthConfig {
            client_id: "client-1".into(),
            client_secret: "secret-1".into(),
            auth_url: Url::parse("https://accounts.example.com/auth").unwrap(),
            token_url: Url::parse("https://oauth2.example.com/token").unwrap(),
            redirect_url: "urn:ietf:wg:oauth:2.0:oob".into(),
            scopes: vec![DRIVE_SCOPE.into()],
        };
        CredentialManager::new(config, TokenStore::new(dir.join("token.json")))
    }

    fn files_url() -> Url {
        Url::parse("https://www.googleapis.com/drive/v3/files").unwrap()
    }

    const TOKEN_REPLY: &str =
        r#"{"access_token":"ya29.first","token_type":"Bearer","refresh_token":"1//r","expires_in":3599}"#;

    #[test]
    fn missing_cache_runs_authorization_once_and_caches_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let prompt = ScriptedPrompt::new("4/code");
        let fake = FakeTransport::new()
            .reply(StatusCode::OK, TOKEN_REPLY)
            .reply(StatusCode::OK, r#"{"files":[]}"#);

        let client = manager.authenticated_client(&fake, &prompt).unwrap();
        assert_eq!(prompt.calls.get(), 1);
        let url = prompt.seen_url.borrow().clone().unwrap();
        assert!(url.as_str().contains("access_type=offline"));

        let cached = TokenStore::new(dir.path().join("token.json")).load().unwrap();
        assert_eq!(cached.access_token, "ya29.first");

        client.send(Request::get(files_url())).unwrap();
        let sent = fake.requests();
        assert_eq!(sent[0].form_value("code"), Some("4/code"));
        assert_eq!(sent[1].authorization(), Some("Bearer ya29.first"));
    }

    #[test]
    fn cached_token_skips_authorization() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager
            .store
            .save(&Token {
                access_token: "ya29.cached".into(),
                token_type: "Bearer".into(),
                refresh_token: Some("1//r".into()),
                expiry: Some(Utc::now() + Duration::hours(1)),
            })
            .unwrap();
        let prompt = ScriptedPrompt::new("unused");
        let fake = FakeTransport::new().reply(StatusCode::OK, "{}");

        let client = manager.authenticated_client(&fake, &prompt).unwrap();
        client.send(Request::get(files_url())).unwrap();

        assert_eq!(prompt.calls.get(), 0);
        assert_eq!(fake.requests().len(), 1);
        assert_eq!(fake.requests()[0].authorization(), Some("Bearer ya29.cached"));
    }

    #[test]
    fn stale_cached_token_refreshes_silently() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager
            .store
            .save(&Token {
                access_token: "ya29.stale".into(),
                token_type: "Bearer".into(),
                refresh_token: Some("1//r".into()),
                expiry: Some(Utc::now() - Duration::hours(2)),
            })
            .unwrap();
        let prompt = ScriptedPrompt::new("unused");
        let fake = FakeTransport::new()
            .reply(
                StatusCode::OK,
                r#"{"access_token":"ya29.renewed","token_type":"Bearer","expires_in":3599}"#,
            )
            .reply(StatusCode::OK, r#"{"files":[]}"#);

        let client = manager.authenticated_client(&fake, &prompt).unwrap();
        let response = client.send(Request::get(files_url())).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(prompt.calls.get(), 0);
        let sent = fake.requests();
        assert_eq!(sent[0].form_value("grant_type"), Some("refresh_token"));
        assert_eq!(sent[1].authorization(), Some("Bearer ya29.renewed"));
        assert_eq!(manager.store.load().unwrap().access_token, "ya29.renewed");
    }

    #[test]
    fn corrupt_cache_falls_back_to_authorization() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        fs::write(dir.path().join("token.json"), r#"{"access_tok"#).unwrap();
        let prompt = ScriptedPrompt::new("4/code");
        let fake = FakeTransport::new().reply(StatusCode::OK, TOKEN_REPLY);

        manager.authenticated_client(&fake, &prompt).unwrap();

        assert_eq!(prompt.calls.get(), 1);
        assert_eq!(manager.store.load().unwrap().access_token, "ya29.first");
    }

    #[test]
    fn failed_exchange_is_fatal_and_caches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let prompt = ScriptedPrompt::new("4/bad");
        let fake = FakeTransport::new()
            .reply(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#);

        let err = manager.authenticated_client(&fake, &prompt).err().unwrap();
        assert!(matches!(err, AuthorizationError::Rejected { .. }));
        assert!(!dir.path().join("token.json").exists());
    }

    #[test]
    fn empty_code_is_rejected_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let fake = FakeTransport::new();

        let err = manager
            .authenticated_client(&fake, &ScriptedPrompt::new("   "))
            .err()
            .unwrap();
        assert!(matches!(err, AuthorizationError::EmptyCode));
        assert!(fake.requests().is_empty());
    }

    #[test]
    fn prompt_failure_is_an_authorization_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let err = manager
            .authenticated_client(FakeTransport::new(), &FailingPrompt)
            .err()
            .unwrap();
        assert!(matches!(err, AuthorizationError::Prompt(_)));
    }

    #[test]
    fn cache_write_failure_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the token file should be makes the write fail.
        let token_path = dir.path().join("token.json");
        fs::create_dir(&token_path).unwrap();
        let manager = CredentialManager::new(manager(dir.path()).config, TokenStore::new(&token_path));
        let fake = FakeTransport::new().reply(StatusCode::OK, TOKEN_REPLY);

        assert!(manager
            .authenticated_client(&fake, &ScriptedPrompt::new("4/code"))
            .is_ok());
    }

    #[test]
    fn loads_registration_from_secret_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("credentials.json"),
            r#"{"installed":{"client_id":"cid","client_secret":"cs","auth_uri":"https://a.example.com/auth","token_uri":"https://a.example.com/token","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();
        let manager = CredentialManager::from_secret_dir(&SecretDir::new(dir.path())).unwrap();
        assert_eq!(manager.config().client_id, "cid");
        assert_eq!(manager.config().scopes, vec![DRIVE_SCOPE.to_string()]);
    }
}
