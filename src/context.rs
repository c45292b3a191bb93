//! Per-request execution context
//!
//! Carries the caller's credential and session id through the whole async
//! call chain that handles one inbound message. The value lives in a tokio
//! task-local, so it follows the logical chain across `.await` points and is
//! invisible to every other chain running concurrently.
//!
//! Spawned tasks do not inherit the context automatically; wrap them with
//! [`propagate`] or use [`spawn_in_context`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{GatewayError, Result};

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

const BEARER_PREFIX: &str = "Bearer ";

/// Opaque bearer credential supplied by the client on every request.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wrap a raw credential. Empty values are rejected.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let raw = raw.as_ref();
        if raw.is_empty() {
            None
        } else {
            Some(Self(Arc::from(raw)))
        }
    }

    /// Extract the credential from an `Authorization` header value.
    ///
    /// Only the `Bearer ` scheme is accepted. A missing header, another
    /// scheme or an empty token are all reported as
    /// [`GatewayError::AuthenticationRequired`].
    pub fn from_authorization_header(header: Option<&str>) -> Result<Self> {
        header
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .and_then(Self::new)
            .ok_or(GatewayError::AuthenticationRequired)
    }

    /// The raw secret, for handing to the downstream invoker.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Immutable bundle scoped to the handling of one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    credential: Credential,
    session_id: Option<String>,
}

impl ExecutionContext {
    /// Create a context for a request
    pub fn new(credential: Credential, session_id: Option<String>) -> Self {
        Self {
            credential,
            session_id,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

/// Run `fut` with `ctx` as the current context.
///
/// Everything awaited inside `fut` observes `ctx`. A nested call shadows the
/// outer context for its own sub-chain only; the outer value is visible
/// again once the nested future completes. Errors and panics from `fut`
/// propagate to the caller with the context already unwound.
pub async fn run_with_context<F>(ctx: ExecutionContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, fut).await
}

/// Synchronous counterpart of [`run_with_context`].
pub fn run_with_context_sync<F, R>(ctx: ExecutionContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT.sync_scope(ctx, f)
}

/// The context of the enclosing [`run_with_context`] scope, if any.
pub fn current_context() -> Option<ExecutionContext> {
    CURRENT.try_with(Clone::clone).ok()
}

/// Credential of the enclosing scope, if any.
pub fn current_credential() -> Option<Credential> {
    CURRENT.try_with(|ctx| ctx.credential.clone()).ok()
}

/// Bind the caller's current context (captured now, not at first poll) to
/// `fut`, so it can run on another task and still observe it.
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let captured = current_context();
    async move {
        match captured {
            Some(ctx) => CURRENT.scope(ctx, fut).await,
            None => fut.await,
        }
    }
}

/// `tokio::spawn` that carries the current context into the new task.
pub fn spawn_in_context<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(propagate(fut))
}
