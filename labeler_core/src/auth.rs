//! Authentication for labeler sessions.
//!
//! This module provides:
//! - Credential resolution (static access token vs. identity token)
//! - Identity-token claim parsing (`user_id`, `name`)
//! - Interactive browser login over a local websocket listener
//! - Access-token minting, listing and deletion, including job tokens

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use labeler_core_types::{AccessTokenGrant, CreateTokenRequest, TokenDeleteBody, TokenListQuery};

use crate::errors::{CoreError, CoreResult};
use crate::http::HttpClient;
use crate::routes::{self, AUTH_DEFAULT_PROJECT, DEFAULT_HOST};

/// Port of the local page that hosts the sign-in flow.
pub const DEFAULT_WEB_PORT: u16 = 52235;

/// Port the sign-in page pushes the identity token to.
pub const DEFAULT_SOCKET_PORT: u16 = 52236;

/// A credential attached to every request body.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Static, user-issued access token.
    AccessToken(String),
    /// Identity token from the interactive login.
    IdToken(String),
}

impl Credential {
    /// JSON key the service expects for this credential.
    pub fn key(&self) -> &'static str {
        match self {
            Credential::AccessToken(_) => "access_token",
            Credential::IdToken(_) => "id_token",
        }
    }

    pub fn secret(&self) -> &str {
        match self {
            Credential::AccessToken(s) | Credential::IdToken(s) => s,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.key(), mask_str(self.secret()))
    }
}

/// Claims carried in an identity token payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Decode the payload segment of a three-part identity token.
pub fn parse_id_token(token: &str) -> CoreResult<IdTokenClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(CoreError::Protocol("incorrect ID token format".to_string()));
    }
    let payload = parts[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| CoreError::Protocol(format!("ID token payload is not base64url: {}", e)))?;
    serde_json::from_slice(&decoded)
        .map_err(|e| CoreError::Protocol(format!("invalid ID token claims: {}", e)))
}

/// Mask a string for display (shows first 8 chars + "...").
pub fn mask_str(s: &str) -> String {
    if s.len() <= 8 {
        return "*".repeat(s.len());
    }
    let prefix: String = s.chars().take(8).collect();
    format!("{}...", prefix)
}

/// Options for the interactive login.
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Page the browser is sent to.
    pub login_url: String,
    /// Local port the sign-in page connects back to.
    pub socket_port: u16,
    pub open_browser: bool,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            login_url: format!("http://localhost:{}", DEFAULT_WEB_PORT),
            socket_port: DEFAULT_SOCKET_PORT,
            open_browser: true,
        }
    }
}

/// Wait for the sign-in page to push an identity token.
///
/// Each connection may send several text frames; the last one received
/// before the peer closes is the token. Resolves to `None` when `shutdown`
/// fires first, or when the page sent an empty token.
pub async fn receive_id_token<F>(listener: TcpListener, shutdown: F) -> Option<String>
where
    F: Future<Output = ()>,
{
    let accept = async {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "login listener accept failed");
                    return None;
                }
            };
            debug!(%peer, "login page connected");
            let mut ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(error = %e, "websocket handshake failed");
                    continue;
                }
            };
            let mut token: Option<String> = None;
            while let Some(frame) = ws.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => token = Some(text.to_string()),
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "login socket closed abruptly");
                        break;
                    }
                }
            }
            if let Some(token) = token {
                return Some(token).filter(|t| !t.is_empty());
            }
        }
    };

    tokio::select! {
        token = accept => token,
        _ = shutdown => None,
    }
}

/// Resolve host and namespace for authentication calls.
fn resolve_namespace(host: Option<&str>, project: Option<&str>) -> CoreResult<(String, String)> {
    let host = host.map(str::trim).filter(|h| !h.is_empty());
    let project = project.map(str::trim).filter(|p| !p.is_empty());
    match (host, project) {
        (Some(_), None) => Err(CoreError::config("project cannot be empty when a host is given")),
        (Some(h), Some(p)) => Ok((routes::normalize_host(h)?, p.to_string())),
        (None, p) => Ok((
            DEFAULT_HOST.to_string(),
            p.unwrap_or(AUTH_DEFAULT_PROJECT).to_string(),
        )),
    }
}

/// Authenticated identity for one host/project.
///
/// Holds either a static access token or an identity token obtained
/// interactively. Mints scoped access tokens, including single-run job
/// tokens.
pub struct Authentication {
    host: String,
    project: String,
    http: HttpClient,
    access_token: Option<String>,
    id_token: Option<String>,
}

impl Authentication {
    /// Authenticate with a static access token. No browser is involved.
    pub async fn with_access_token(
        host: Option<&str>,
        project: Option<&str>,
        access_token: &str,
    ) -> CoreResult<Self> {
        if access_token.trim().is_empty() {
            return Err(CoreError::config("access token cannot be empty"));
        }
        let auth = Self::connect(host, project, Some(access_token.to_string())).await?;
        Ok(auth)
    }

    /// Authenticate interactively through the browser sign-in page.
    ///
    /// Suspends until the page pushes a token or the user interrupts the
    /// process; an interrupted login leaves no identity token set.
    pub async fn login(
        host: Option<&str>,
        project: Option<&str>,
        options: &LoginOptions,
    ) -> CoreResult<Self> {
        let mut auth = Self::connect(host, project, None).await?;
        auth.reauthenticate(options).await?;
        Ok(auth)
    }

    async fn connect(
        host: Option<&str>,
        project: Option<&str>,
        access_token: Option<String>,
    ) -> CoreResult<Self> {
        let (host, project) = resolve_namespace(host, project)?;
        let http = HttpClient::new(&routes::project_base(&host, &project), None);
        http.url_check().await?;
        Ok(Self {
            host,
            project,
            http,
            access_token,
            id_token: None,
        })
    }

    /// Re-run the interactive login and replace the identity token.
    pub async fn reauthenticate(&mut self, options: &LoginOptions) -> CoreResult<()> {
        let listener = TcpListener::bind(("127.0.0.1", options.socket_port))
            .await
            .map_err(|e| CoreError::Internal(format!("failed to bind login listener: {}", e)))?;

        info!(url = %options.login_url, "waiting for browser sign-in");
        if options.open_browser && open::that(&options.login_url).is_err() {
            warn!(url = %options.login_url, "could not open browser; visit the URL manually");
        }

        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        self.id_token = receive_id_token(listener, shutdown).await;
        if self.id_token.is_none() {
            info!("sign-in cancelled");
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn get_id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Credential used for requests; an identity token wins over an access token.
    pub fn credential(&self) -> CoreResult<Credential> {
        if let Some(token) = self.id_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(Credential::IdToken(token.clone()));
        }
        if let Some(token) = self.access_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(Credential::AccessToken(token.clone()));
        }
        Err(CoreError::config("no credential available; sign in or provide an access token"))
    }

    fn tokens_client(&self) -> CoreResult<HttpClient> {
        Ok(self.http.with_credential(Some(self.credential()?)))
    }

    /// Mint a new access token.
    ///
    /// With `request.job = true` the token is scoped to one labeling job:
    /// its `uid` doubles as the job UUID.
    pub async fn create_access_token(
        &self,
        request: &CreateTokenRequest,
    ) -> CoreResult<AccessTokenGrant> {
        let grant: AccessTokenGrant = self
            .tokens_client()?
            .post(routes::TOKENS, &[], request)
            .await?;
        debug!(uid = %grant.uid, job = request.job, "access token created");
        Ok(grant)
    }

    /// List access tokens owned by the signed-in user.
    pub async fn get_access_tokens(&self, job: bool) -> CoreResult<Value> {
        Ok(self
            .tokens_client()?
            .get(routes::TOKENS, &[], &TokenListQuery { job })
            .await?)
    }

    /// Delete access tokens by id.
    pub async fn delete_access_tokens(&self, id_list: &[String]) -> CoreResult<Value> {
        Ok(self
            .tokens_client()?
            .delete(routes::TOKENS, &[], &TokenDeleteBody { id_list })
            .await?)
    }
}

impl std::fmt::Debug for Authentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authentication")
            .field("host", &self.host)
            .field("project", &self.project)
            .field("signed_in", &self.id_token.is_some())
            .finish_non_exhaustive()
    }
}
