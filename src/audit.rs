/// Audit trail
///
/// Every credential flow ends in exactly one audit entry, written through
/// `tracing` under the `audit` target so it can be routed separately.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Register,
    VerifyEmail,
    Login,
    Refresh,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "REGISTER",
            AuditAction::VerifyEmail => "VERIFY_EMAIL",
            AuditAction::Login => "LOGIN",
            AuditAction::Refresh => "REFRESH",
            AuditAction::Logout => "LOGOUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub log_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub user_id: Option<UserId>,
    /// Short machine-readable reason, e.g. an error code
    pub detail: Option<String>,
}

impl AuditLog {
    pub fn success(action: AuditAction) -> Self {
        Self::new(action, AuditOutcome::Success)
    }

    pub fn failure(action: AuditAction, detail: impl Into<String>) -> Self {
        let mut log = Self::new(action, AuditOutcome::Failure);
        log.detail = Some(detail.into());
        log
    }

    fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            log_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action,
            outcome,
            user_id: None,
            detail: None,
        }
    }

    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn emit(&self) {
        let user_id = self.user_id.map(|id| id.0);
        match self.outcome {
            AuditOutcome::Failure => tracing::warn!(
                target: "audit",
                log_id = %self.log_id,
                action = self.action.as_str(),
                user_id = ?user_id,
                detail = ?self.detail,
                "Audit log entry"
            ),
            AuditOutcome::Success => tracing::info!(
                target: "audit",
                log_id = %self.log_id,
                action = self.action.as_str(),
                user_id = ?user_id,
                "Audit log entry"
            ),
        }
    }
}
