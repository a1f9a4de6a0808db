use std::{collections::HashMap, time};

use crate::{
    error::{ErrorKind, ServiceError},
    transport::{ApiRequest, ApiResponse, HttpTransport},
    worker,
};

/// Credentials used to open a FusionDirectory session.
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub directory: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on directory '{}'", self.user, self.directory)
    }
}

/// A session token handed out by FusionDirectory on login.
#[derive(Debug, Clone)]
pub struct Token {
    session_id: String,
    created: time::Instant,
}

impl Token {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            created: time::Instant::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the token is older than the given validity. Without a validity, tokens never expire locally.
    pub fn has_expired(&self, validity: Option<time::Duration>) -> bool {
        validity.is_some_and(|validity| self.created.elapsed() >= validity)
    }
}

/// Keeps one FusionDirectory session per worker, logging in whenever a worker has no usable token.
///
/// FusionDirectory sessions expire on the server side without notice. Requests answered with 401 are
/// therefore retried once after logging in again.
///
/// Tokens of workers that stopped are only dropped on login once they are older than the token validity.
/// Without a validity they are kept until [Session::forget], so worker ids should be reused.
pub struct Session {
    transport: HttpTransport,
    credentials: Credentials,
    token_validity: Option<time::Duration>,
    tokens: tokio::sync::RwLock<HashMap<worker::WorkerId, Token>>,
}

impl Session {
    pub fn new(transport: HttpTransport, credentials: Credentials, token_validity: Option<time::Duration>) -> Self {
        Self {
            transport,
            credentials,
            token_validity,
            tokens: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    #[cfg(test)]
    pub(crate) async fn worker_count(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Open a new session for the current worker, replacing any token it had before.
    pub async fn login(&self) -> Result<String, ServiceError> {
        let worker = worker::current();
        tracing::info!(
            endpoint = self.transport.endpoint(),
            user = %self.credentials.user,
            %worker,
            "Login to FusionDirectory"
        );

        let request = ApiRequest::post(&["login"]).with_body(serde_json::json!({
            "user": self.credentials.user,
            "password": self.credentials.password,
            "directory": self.credentials.directory,
        }));
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            let message = format!("Cannot log in FusionDirectory, message: {}", response.body);
            tracing::error!(status = response.status.as_u16(), %worker, "{}", message);
            let kind = if response.status == reqwest::StatusCode::UNAUTHORIZED {
                ErrorKind::Unauthorized
            } else {
                ErrorKind::Rejected
            };
            return Err(ServiceError(kind, message));
        }

        let session_id = response.body.replace(['\n', '\r', '"'], "");
        if session_id.trim().is_empty() {
            return Err(ServiceError(
                ErrorKind::InvalidPayload,
                "FusionDirectory answered the login with an empty session token".to_string(),
            ));
        }
        tracing::debug!(token = %session_id, %worker, "Register token for worker");
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, token| !token.has_expired(self.token_validity));
        tokens.insert(worker, Token::new(session_id.clone()));
        Ok(session_id)
    }

    /// The token of the current worker, if it has one that did not expire yet.
    async fn current_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .get(&worker::current())
            .filter(|token| !token.has_expired(self.token_validity))
            .map(|token| token.session_id().to_string())
    }

    async fn token_or_login(&self) -> Result<String, ServiceError> {
        match self.current_token().await {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    /// Check whether the session of the current worker is still valid, and open a new one if necessary.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        let Some(token) = self.current_token().await else {
            self.login().await?;
            return Ok(());
        };

        let response = self.transport.send(&ApiRequest::get(&["token"]).with_session_token(&token)).await?;
        if response.status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::info!(worker = %worker::current(), "FusionDirectory session has expired. Reconnecting ...");
            self.login().await?;
        } else if !response.is_success() {
            let message = format!("Cannot ping FusionDirectory, message: {}", response.body);
            tracing::error!(status = response.status.as_u16(), "{}", message);
            return Err(ServiceError(ErrorKind::Rejected, message));
        }
        Ok(())
    }

    /// Drop the session token of the current worker. The next request will log in again.
    pub async fn forget(&self) {
        self.tokens.write().await.remove(&worker::current());
    }

    /// Send a request within the session of the current worker.
    /// Only successful answers are returned, everything else is converted into an error.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
        let token = self.token_or_login().await?;
        let mut response = self.transport.send(&request.with_session_token(&token)).await?;

        if response.status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::info!(worker = %worker::current(), %request, "FusionDirectory session has expired. Reconnecting ...");
            let token = self.login().await?;
            response = self.transport.send(&request.with_session_token(&token)).await?;
        }

        if !response.is_success() {
            let error = ServiceError::from_status(response.status, &response.body);
            tracing::error!(%request, error = %error, "FusionDirectory request failed");
            return Err(error);
        }
        Ok(response)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FusionDirectory session of {:?} via {:?}", self.credentials, self.transport)
    }
}
