// Interactive consent for installed apps: show the Google authorization
// URL (and open it in the browser), wait for the redirect on a loopback
// port, then exchange the returned code (with PKCE) for a token.
//
// The redirect endpoint is a one-route axum server on a current-thread
// tokio runtime. It stops as soon as a code or an error has arrived.

use crate::auth::{Authorizer, ClientSecrets, OAuthClient, StoredToken};
use crate::error::{Error, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use url::Url;

const SUCCESS_PAGE: &str = "The authentication flow has completed. You may close this window.";
const DENIED_PAGE: &str = "Authorization was denied.";
const INVALID_PAGE: &str = "Invalid authorization response.";

/// How long the user has to finish consent in the browser.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

pub struct LoopbackAuthorizer {
    oauth: OAuthClient,
    open_browser: bool,
}

impl LoopbackAuthorizer {
    pub fn new(oauth: OAuthClient) -> Self {
        LoopbackAuthorizer {
            oauth,
            open_browser: true,
        }
    }

    /// Only print the authorization URL.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }
}

impl Authorizer for LoopbackAuthorizer {
    fn authorize(&self, secrets: &ClientSecrets, scopes: &[&str]) -> Result<StoredToken> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());

        let state = random_string(32);
        let verifier = random_string(64);
        let url = authorization_url(secrets, scopes, &redirect_uri, &state, &code_challenge(&verifier))?;

        let opener = |u: &str| webbrowser::open(u);
        present_url(&url, self.open_browser.then_some(&opener as &dyn Fn(&str) -> io::Result<()>));
        tracing::debug!(redirect_uri = %redirect_uri, "waiting for authorization redirect");

        let code = wait_for_code(listener, &state, CONSENT_TIMEOUT)?;
        self.oauth
            .exchange_code(secrets, &code, &redirect_uri, &verifier, scopes)
    }
}

/// Print the URL and try to open it. Returns whether a browser was launched.
fn present_url(url: &Url, open: Option<&dyn Fn(&str) -> io::Result<()>>) -> bool {
    println!("Please visit this URL to authorize this application:\n{}", url);
    match open.map(|open| open(url.as_str())) {
        Some(Ok(())) => true,
        Some(Err(e)) => {
            tracing::debug!("could not open a browser: {}", e);
            false
        }
        None => false,
    }
}

fn authorization_url(
    secrets: &ClientSecrets,
    scopes: &[&str],
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<Url> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| Error::Auth(format!("bad auth_uri {:?}: {}", secrets.auth_uri, e)))
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Outcome of one request hitting the loopback listener.
#[derive(Debug, PartialEq)]
enum Redirect {
    Code(String),
    Denied(String),
    // favicon requests and the like
    Unrelated,
}

/// Classify the query of a redirect request.
fn parse_redirect(params: &HashMap<String, String>, expected_state: &str) -> Result<Redirect> {
    let code = params.get("code");
    let error = params.get("error");
    if code.is_none() && error.is_none() {
        return Ok(Redirect::Unrelated);
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(Error::Auth("state mismatch in authorization response".into()));
    }
    match (code, error) {
        (_, Some(error)) => Ok(Redirect::Denied(error.clone())),
        (Some(code), None) => Ok(Redirect::Code(code.clone())),
        (None, None) => Ok(Redirect::Unrelated),
    }
}

struct Loopback {
    expected_state: String,
    outcome: mpsc::UnboundedSender<Result<Redirect>>,
}

async fn redirect(
    State(loopback): State<Arc<Loopback>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let outcome = parse_redirect(&params, &loopback.expected_state);
    let reply = match &outcome {
        Ok(Redirect::Unrelated) => return (StatusCode::NOT_FOUND, ""),
        Ok(Redirect::Code(_)) => (StatusCode::OK, SUCCESS_PAGE),
        Ok(Redirect::Denied(_)) => (StatusCode::OK, DENIED_PAGE),
        Err(_) => (StatusCode::BAD_REQUEST, INVALID_PAGE),
    };
    let _ = loopback.outcome.send(outcome);
    reply
}

/// Serve the redirect endpoint on `listener` until a code or error arrives.
fn wait_for_code(listener: TcpListener, state: &str, timeout: Duration) -> Result<String> {
    listener.set_nonblocking(true)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    match runtime.block_on(serve_redirect(listener, state.to_string(), timeout))? {
        Redirect::Code(code) => Ok(code),
        Redirect::Denied(reason) => Err(Error::Auth(format!("authorization denied: {}", reason))),
        Redirect::Unrelated => Err(Error::Auth("no authorization code received".into())),
    }
}

async fn serve_redirect(
    listener: TcpListener,
    expected_state: String,
    timeout: Duration,
) -> Result<Redirect> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/", get(redirect))
        .with_state(Arc::new(Loopback {
            expected_state,
            outcome: tx,
        }));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let received = tokio::time::timeout(timeout, rx.recv()).await;
    let _ = stop_tx.send(());
    // Lets the final response go out; idle connections are dropped with the runtime.
    if tokio::time::timeout(Duration::from_secs(5), server).await.is_err() {
        tracing::debug!("loopback server did not shut down in time");
    }

    match received {
        Ok(Some(outcome)) => outcome,
        Ok(None) => Err(Error::Auth("loopback server stopped".into())),
        Err(_) => Err(Error::Auth(
            "timed out waiting for the authorization redirect".into(),
        )),
    }
}
