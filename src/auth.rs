// OAuth token handling.
//
// The persisted token (`token.json`) uses the same authorized-user layout
// Google's client libraries write, so an existing file can be reused. The
// session is loaded into an `AuthSession` and moved to a usable token either
// as-is, by refreshing it, or by asking an `Authorizer` for fresh consent.
// Once a run is under way, `TokenSource` keeps the token fresh.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/classroom.courses.readonly",
    "https://www.googleapis.com/auth/classroom.announcements.readonly",
    "https://www.googleapis.com/auth/classroom.courseworkmaterials.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
];

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 300;

/// OAuth client identity from the Cloud Console download (`credentials.json`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

// The console wraps the secret in "installed" or "web" depending on the app type.
#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigMissing(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        let file: ClientSecretsFile = serde_json::from_str(&data)?;
        file.installed.or(file.web).ok_or_else(|| {
            Error::Auth(format!(
                "{} has neither an \"installed\" nor a \"web\" section",
                path.display()
            ))
        })
    }
}

/// Persisted authorization, compatible with Google's `authorized_user` JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Obtains a brand new token, normally by asking the user for consent.
pub trait Authorizer {
    fn authorize(&self, secrets: &ClientSecrets, scopes: &[&str]) -> Result<StoredToken>;
}

/// Exchanges a refresh token for a new access token.
pub trait TokenRefresher {
    fn refresh(&self, token: &StoredToken) -> Result<StoredToken>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthSession {
    NoToken,
    Valid(StoredToken),
    Expired(StoredToken),
}

impl AuthSession {
    pub fn from_token(token: StoredToken, now: DateTime<Utc>) -> Self {
        if token.is_expired(now) {
            AuthSession::Expired(token)
        } else {
            AuthSession::Valid(token)
        }
    }

    /// Load the session from `path`. A missing or unreadable token file
    /// starts from `NoToken`.
    pub fn load(path: &Path, now: DateTime<Utc>) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("cannot read {}: {}", path.display(), e);
                }
                return AuthSession::NoToken;
            }
        };
        match serde_json::from_str::<StoredToken>(&data) {
            Ok(token) => Self::from_token(token, now),
            Err(e) => {
                tracing::warn!("ignoring unusable token file {}: {}", path.display(), e);
                AuthSession::NoToken
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, AuthSession::Valid(_))
    }

    /// Use the stored refresh token. Falls back to `reauthorize` when the
    /// token has none or the refresh is rejected.
    pub fn refresh(
        self,
        refresher: &dyn TokenRefresher,
        secrets: &dyn Fn() -> Result<ClientSecrets>,
        authorizer: &dyn Authorizer,
    ) -> Result<StoredToken> {
        match self {
            AuthSession::Expired(token) if token.refresh_token.is_some() => {
                match refresher.refresh(&token) {
                    Ok(fresh) => {
                        tracing::info!("access token refreshed");
                        Ok(fresh)
                    }
                    Err(e) => {
                        tracing::warn!("token refresh failed, asking for consent again: {}", e);
                        Self::reauthorize(&secrets()?, authorizer)
                    }
                }
            }
            AuthSession::Valid(token) => Ok(token),
            _ => Self::reauthorize(&secrets()?, authorizer),
        }
    }

    pub fn reauthorize(secrets: &ClientSecrets, authorizer: &dyn Authorizer) -> Result<StoredToken> {
        tracing::info!("starting interactive authorization");
        authorizer.authorize(secrets, SCOPES)
    }
}

/// Return a usable token, refreshing or re-authorizing as needed and
/// persisting any new token to `token_path`.
pub fn authenticate(
    token_path: &Path,
    secrets_path: &Path,
    authorizer: &dyn Authorizer,
    refresher: &dyn TokenRefresher,
) -> Result<StoredToken> {
    let token = match AuthSession::load(token_path, Utc::now()) {
        AuthSession::Valid(token) => {
            tracing::debug!("using stored token from {}", token_path.display());
            return Ok(token);
        }
        session => session.refresh(refresher, &|| ClientSecrets::load(secrets_path), authorizer)?,
    };
    token.save(token_path)?;
    tracing::debug!("token saved to {}", token_path.display());
    Ok(token)
}

/// The token used by API calls for the rest of a run. It is refreshed when
/// it expires or the server rejects it, and the new token is written back.
pub struct TokenSource {
    token: RefCell<StoredToken>,
    refresher: Box<dyn TokenRefresher>,
    save_to: Option<PathBuf>,
}

impl TokenSource {
    pub fn new(token: StoredToken, refresher: Box<dyn TokenRefresher>) -> Self {
        TokenSource {
            token: RefCell::new(token),
            refresher,
            save_to: None,
        }
    }

    /// Save refreshed tokens to `path`.
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_to = Some(path.into());
        self
    }

    pub fn current(&self) -> StoredToken {
        self.token.borrow().clone()
    }

    pub fn can_refresh(&self) -> bool {
        self.token.borrow().refresh_token.is_some()
    }

    /// Access token for the next request, refreshed first if it has expired.
    pub fn access_token(&self) -> Result<String> {
        let expired = self.token.borrow().is_expired(Utc::now());
        if expired && self.can_refresh() {
            tracing::debug!("access token expired, refreshing");
            self.refresh()?;
        }
        Ok(self.token.borrow().token.clone())
    }

    pub fn refresh(&self) -> Result<()> {
        let fresh = self.refresher.refresh(&self.token.borrow())?;
        tracing::info!("access token refreshed");
        if let Some(path) = &self.save_to {
            match fresh.save(path) {
                Ok(()) => tracing::debug!("token saved to {}", path.display()),
                Err(e) => tracing::warn!("cannot save token to {}: {}", path.display(), e),
            }
        }
        *self.token.borrow_mut() = fresh;
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Talks to the OAuth token endpoint: code exchange and refresh.
#[derive(Clone)]
pub struct OAuthClient {
    client: Client,
}

impl OAuthClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(OAuthClient { client })
    }

    /// Trade an authorization code from the consent redirect for a token.
    pub fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        scopes: &[&str],
    ) -> Result<StoredToken> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("code_verifier", code_verifier),
        ];
        let resp = self.post_token(&secrets.token_uri, &params)?;
        Ok(StoredToken {
            token: resp.access_token,
            refresh_token: resp.refresh_token,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: granted_scopes(resp.scope.as_deref(), scopes),
            expiry: resp.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }

    fn post_token(&self, token_uri: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let res = self.client.post(token_uri).form(params).send()?;
        let status = res.status();
        let body = res.text()?;
        if !status.is_success() {
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => format!("{} - {}", status, body),
            };
            return Err(Error::Auth(reason));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl TokenRefresher for OAuthClient {
    fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::Auth("no refresh token stored".into()))?;
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", token.client_id.as_str()),
            ("client_secret", token.client_secret.as_str()),
        ];
        let resp = self.post_token(&token.token_uri, &params)?;
        Ok(StoredToken {
            token: resp.access_token,
            // Google usually omits the refresh token on refresh; keep the old one.
            refresh_token: resp.refresh_token.or_else(|| token.refresh_token.clone()),
            expiry: resp.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            ..token.clone()
        })
    }
}

fn granted_scopes(granted: Option<&str>, requested: &[&str]) -> Vec<String> {
    match granted {
        Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
        None => requested.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn token(expiry: Option<DateTime<Utc>>, refresh: Option<&str>) -> StoredToken {
        StoredToken {
            token: "access".into(),
            refresh_token: refresh.map(str::to_string),
            token_uri: "https://oauth2.googleapis.com/token".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry,
        }
    }

    #[derive(Default)]
    struct Stub {
        authorized: Cell<u32>,
        refreshed: Cell<u32>,
        fail_refresh: bool,
    }

    impl Authorizer for Stub {
        fn authorize(&self, secrets: &ClientSecrets, scopes: &[&str]) -> Result<StoredToken> {
            self.authorized.set(self.authorized.get() + 1);
            assert_eq!(scopes, SCOPES);
            let mut t = token(None, Some("new-refresh"));
            t.token = format!("consented-{}", secrets.client_id);
            Ok(t)
        }
    }

    impl TokenRefresher for Stub {
        fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
            self.refreshed.set(self.refreshed.get() + 1);
            if self.fail_refresh {
                return Err(Error::Auth("invalid_grant".into()));
            }
            Ok(StoredToken {
                token: "refreshed".into(),
                expiry: Some(Utc::now() + Duration::hours(1)),
                ..token.clone()
            })
        }
    }

    fn write_secrets(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("credentials.json");
        fs::write(
            &path,
            r#"{"installed":{"client_id":"cid","client_secret":"cs",
                "auth_uri":"https://accounts.google.com/o/oauth2/auth",
                "token_uri":"https://oauth2.googleapis.com/token",
                "redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn session_states() {
        let now = Utc::now();
        assert!(AuthSession::from_token(token(None, None), now).is_valid());
        let expired = AuthSession::from_token(token(Some(now - Duration::minutes(1)), None), now);
        assert!(matches!(expired, AuthSession::Expired(_)));
        // inside the skew window
        let soon = AuthSession::from_token(token(Some(now + Duration::seconds(30)), None), now);
        assert!(matches!(soon, AuthSession::Expired(_)));
    }

    #[test]
    fn load_missing_or_corrupt_token_is_no_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        assert_eq!(AuthSession::load(&path, Utc::now()), AuthSession::NoToken);
        fs::write(&path, "not json").unwrap();
        assert_eq!(AuthSession::load(&path, Utc::now()), AuthSession::NoToken);
    }

    #[test]
    fn reads_google_authorized_user_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"token": "ya29.a0", "refresh_token": "1//0g", "token_uri": "https://oauth2.googleapis.com/token",
                "client_id": "cid", "client_secret": "cs", "scopes": ["s"], "universe_domain": "googleapis.com",
                "account": "", "expiry": "2020-05-01T12:34:56.789012Z"}"#,
        )
        .unwrap();
        match AuthSession::load(&path, Utc::now()) {
            AuthSession::Expired(t) => {
                assert_eq!(t.token, "ya29.a0");
                assert_eq!(t.refresh_token.as_deref(), Some("1//0g"));
            }
            other => panic!("expected Expired, got {:?}", other),
        }
    }

    #[test]
    fn valid_token_is_used_as_is() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.json");
        token(Some(Utc::now() + Duration::hours(1)), None).save(&token_path).unwrap();
        let stub = Stub::default();
        // no credentials.json needed
        let t = authenticate(&token_path, &dir.path().join("missing.json"), &stub, &stub).unwrap();
        assert_eq!(t.token, "access");
        assert_eq!(stub.authorized.get(), 0);
        assert_eq!(stub.refreshed.get(), 0);
    }

    #[test]
    fn expired_token_is_refreshed_and_saved() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.json");
        token(Some(Utc::now() - Duration::hours(1)), Some("r")).save(&token_path).unwrap();
        let stub = Stub::default();
        let t = authenticate(&token_path, &dir.path().join("missing.json"), &stub, &stub).unwrap();
        assert_eq!(t.token, "refreshed");
        assert_eq!(stub.refreshed.get(), 1);
        assert_eq!(stub.authorized.get(), 0);
        assert!(AuthSession::load(&token_path, Utc::now()).is_valid());
    }

    #[test]
    fn failed_refresh_falls_back_to_consent() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.json");
        let secrets = write_secrets(&dir);
        token(Some(Utc::now() - Duration::hours(1)), Some("r")).save(&token_path).unwrap();
        let stub = Stub {
            fail_refresh: true,
            ..Stub::default()
        };
        let t = authenticate(&token_path, &secrets, &stub, &stub).unwrap();
        assert_eq!(t.token, "consented-cid");
        assert_eq!(stub.authorized.get(), 1);
    }

    #[test]
    fn no_token_runs_consent_and_persists() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.json");
        let secrets = write_secrets(&dir);
        let stub = Stub::default();
        let t = authenticate(&token_path, &secrets, &stub, &stub).unwrap();
        assert_eq!(t.token, "consented-cid");
        let saved: StoredToken =
            serde_json::from_str(&fs::read_to_string(&token_path).unwrap()).unwrap();
        assert_eq!(saved, t);
    }

    #[test]
    fn missing_client_secret_is_config_missing() {
        let dir = TempDir::new().unwrap();
        let stub = Stub::default();
        let err = authenticate(
            &dir.path().join("token.json"),
            &dir.path().join("credentials.json"),
            &stub,
            &stub,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigMissing(_)));
        assert_eq!(stub.authorized.get(), 0);
    }

    #[test]
    fn web_client_secrets_are_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(
            &path,
            r#"{"web":{"client_id":"w","client_secret":"s","auth_uri":"a","token_uri":"t"}}"#,
        )
        .unwrap();
        assert_eq!(ClientSecrets::load(&path).unwrap().client_id, "w");
        fs::write(&path, "{}").unwrap();
        assert!(matches!(ClientSecrets::load(&path), Err(Error::Auth(_))));
    }

    struct Renewer {
        calls: Rc<Cell<u32>>,
    }

    impl TokenRefresher for Renewer {
        fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
            self.calls.set(self.calls.get() + 1);
            Ok(StoredToken {
                token: format!("renewed-{}", self.calls.get()),
                expiry: Some(Utc::now() + Duration::hours(1)),
                ..token.clone()
            })
        }
    }

    fn token_source(token: StoredToken) -> (TokenSource, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let source = TokenSource::new(token, Box::new(Renewer { calls: calls.clone() }));
        (source, calls)
    }

    #[test]
    fn token_source_refreshes_expired_token_and_saves_it() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.json");
        let (source, calls) = token_source(token(Some(Utc::now() - Duration::minutes(1)), Some("r")));
        let source = source.persist_to(&token_path);

        assert_eq!(source.access_token().unwrap(), "renewed-1");
        // fresh now; no second refresh
        assert_eq!(source.access_token().unwrap(), "renewed-1");
        assert_eq!(calls.get(), 1);
        match AuthSession::load(&token_path, Utc::now()) {
            AuthSession::Valid(saved) => {
                assert_eq!(saved.token, "renewed-1");
                assert_eq!(saved.refresh_token.as_deref(), Some("r"));
            }
            other => panic!("expected Valid, got {:?}", other),
        }
    }

    #[test]
    fn token_source_leaves_valid_token_alone() {
        let (source, calls) = token_source(token(Some(Utc::now() + Duration::hours(1)), Some("r")));
        assert_eq!(source.access_token().unwrap(), "access");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn token_source_without_refresh_token_keeps_old_token() {
        let (source, calls) = token_source(token(Some(Utc::now() - Duration::minutes(1)), None));
        assert!(!source.can_refresh());
        assert_eq!(source.access_token().unwrap(), "access");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn scope_string_is_split() {
        assert_eq!(granted_scopes(Some("a b"), SCOPES), vec!["a", "b"]);
        assert_eq!(granted_scopes(None, &["x"]), vec!["x"]);
    }
}
