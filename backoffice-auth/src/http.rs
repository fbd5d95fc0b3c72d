//! Authenticated HTTP client
//!
//! Wraps the raw transport with the session's concerns: attach the bearer
//! token, recover from a 401 by refreshing and retrying once, and translate
//! 403 into the access-denied flow. Auth endpoints themselves are exempt
//! from recovery, since a 401 from login or refresh means the recovery path
//! itself has failed.

use backoffice_api::{is_auth_endpoint, ApiRequest, ApiResponse, ApiTransport};
use backoffice_core::{BackofficeError, BackofficeResult, ErrorContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::events::ConsoleEvent;
use crate::session::SessionManager;

/// Transport wrapper that keeps requests authenticated
pub struct AuthHttpClient {
    transport: Arc<dyn ApiTransport>,
    session: SessionManager,
    /// Set while a 401 recovery is underway. A second 401 arriving in that
    /// window ends the session instead of queueing behind the refresh.
    refreshing: AtomicBool,
}

impl AuthHttpClient {
    pub fn new(transport: Arc<dyn ApiTransport>, session: SessionManager) -> Self {
        Self {
            transport,
            session,
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Execute a request with the session's credentials and recovery rules
    pub async fn send(&self, request: ApiRequest) -> BackofficeResult<ApiResponse> {
        let request = request.with_bearer(self.session.tokens().access_token());
        let response = self.transport.execute(request.clone()).await?;

        if response.is_unauthorized() {
            return self.recover_unauthorized(request).await;
        }
        if response.is_forbidden() {
            return Err(self.handle_forbidden(&request));
        }
        Ok(response)
    }

    async fn recover_unauthorized(&self, request: ApiRequest) -> BackofficeResult<ApiResponse> {
        if is_auth_endpoint(&request.path) {
            return Err(unauthorized(&request.path, "Auth endpoint rejected the request"));
        }

        if self.refreshing.swap(true, Ordering::SeqCst) {
            warn!(path = %request.path, "Second 401 while recovery in flight; ending session");
            self.session.force_logout("session expired").await;
            return Err(unauthorized(&request.path, "Session expired"));
        }

        debug!(path = %request.path, "Got 401; attempting token refresh");
        let refresh_result = self.session.refresh(false).await;
        self.refreshing.store(false, Ordering::SeqCst);

        match refresh_result {
            Ok(Some(session)) => {
                let retry = request.with_bearer(Some(session.tokens.access_token));
                let retried = self.transport.execute(retry.clone()).await?;
                if retried.is_unauthorized() {
                    // The fresh token was rejected too; no second recovery.
                    self.session.force_logout("retry rejected").await;
                    return Err(unauthorized(&retry.path, "Session expired"));
                }
                if retried.is_forbidden() {
                    return Err(self.handle_forbidden(&retry));
                }
                Ok(retried)
            }
            Ok(None) => {
                self.session.force_logout("no refresh token").await;
                Err(unauthorized(&request.path, "Session expired"))
            }
            Err(e) => {
                debug!(error = %e, "Refresh failed during 401 recovery");
                self.session.force_logout("refresh failed").await;
                Err(unauthorized(&request.path, "Session expired"))
            }
        }
    }

    fn handle_forbidden(&self, request: &ApiRequest) -> BackofficeError {
        warn!(path = %request.path, "Request forbidden");
        self.session.events().emit(ConsoleEvent::AccessDenied {
            detail: request.path.clone(),
        });
        self.session.events().emit(ConsoleEvent::RedirectTo {
            path: self.session.config().denied_route.clone(),
            query: Vec::new(),
        });
        BackofficeError::Forbidden {
            message: format!("{} is not permitted", request.path),
            context: ErrorContext::new("auth_http").with_operation("send"),
        }
    }
}

fn unauthorized(path: &str, message: &str) -> BackofficeError {
    BackofficeError::Unauthorized {
        message: message.to_string(),
        context: ErrorContext::new("auth_http")
            .with_operation("send")
            .with_metadata("path", path),
    }
}
