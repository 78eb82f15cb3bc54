use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::id::Uid;
use crate::error::CoreError;

/// Per-call request context threaded through every core operation.
///
/// Carries the authenticated caller, a cancellation token that propagates
/// into storage, network and evaluator calls, and an optional deadline.
#[derive(Debug, Clone)]
pub struct Ctx {
    /// Authenticated user, if any.
    pub user_id: Option<Uid>,
    /// Cancellation signal for the whole call.
    pub cancel: CancellationToken,
    /// Absolute deadline for the whole call.
    pub deadline: Option<Instant>,
}

impl Ctx {
    /// Context for an authenticated caller with no deadline.
    pub fn for_user(user_id: Uid) -> Self {
        Self {
            user_id: Some(user_id),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context with no caller identity, used by internal maintenance paths.
    pub fn internal() -> Self {
        Self {
            user_id: None,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Attach an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The authenticated user, or `Unauthenticated`.
    pub fn require_user(&self) -> Result<&Uid, CoreError> {
        self.user_id
            .as_ref()
            .ok_or_else(|| CoreError::Unauthenticated("no user in context".to_string()))
    }

    /// Error out if the caller has cancelled or the deadline has passed.
    pub fn check_live(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled("caller cancelled".to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(CoreError::Timeout("call deadline expired".to_string()));
            }
        }
        Ok(())
    }
}
