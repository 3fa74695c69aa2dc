//! Authentication and process visibility inputs.
//!
//! Both values are produced outside the sync core (by the auth collaborator
//! and the OS respectively); the core only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::value_object::UserId;

/// Authentication status reported by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStatus {
    Idle,
    Loading,
    Authenticated,
}

/// Current authentication session.
///
/// Idle → Loading (sign-in attempt) → Authenticated (success) or back to
/// Idle (failure / sign-out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub status: AuthStatus,
    pub user_id: Option<UserId>,
    pub token: Option<String>,
}

impl AuthSession {
    /// Signed-out session.
    pub fn idle() -> Self {
        Self {
            status: AuthStatus::Idle,
            user_id: None,
            token: None,
        }
    }

    /// Sign-in in progress.
    pub fn loading() -> Self {
        Self {
            status: AuthStatus::Loading,
            user_id: None,
            token: None,
        }
    }

    /// Signed-in session for `user_id` holding a bearer `token`.
    pub fn authenticated(user_id: UserId, token: String) -> Self {
        Self {
            status: AuthStatus::Authenticated,
            user_id: Some(user_id),
            token: Some(token),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::idle()
    }
}

/// Process visibility as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessVisibility {
    Active,
    Inactive,
    Background,
}

impl ProcessVisibility {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether moving from `self` to `next` is a foreground-regain.
    pub fn is_foreground_regain(&self, next: ProcessVisibility) -> bool {
        !self.is_active() && next.is_active()
    }
}

impl fmt::Display for ProcessVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Background => "background",
        };
        write!(f, "{name}")
    }
}

/// Whether the live channel should be open for the given inputs.
///
/// Open exactly when the user is authenticated and the process is active.
pub fn channel_should_be_open(status: AuthStatus, visibility: ProcessVisibility) -> bool {
    status == AuthStatus::Authenticated && visibility.is_active()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_should_be_open_truth_table() {
        // テスト項目: 認証済みかつ Active の場合のみチャンネルを開く
        let statuses = [AuthStatus::Idle, AuthStatus::Loading, AuthStatus::Authenticated];
        let visibilities = [
            ProcessVisibility::Active,
            ProcessVisibility::Inactive,
            ProcessVisibility::Background,
        ];

        for status in statuses {
            for visibility in visibilities {
                // when (操作):
                let open = channel_should_be_open(status, visibility);

                // then (期待する結果):
                let expected =
                    status == AuthStatus::Authenticated && visibility == ProcessVisibility::Active;
                assert_eq!(open, expected, "{status:?} / {visibility:?}");
            }
        }
    }

    #[test]
    fn test_foreground_regain_detection() {
        // テスト項目: Background/Inactive → Active のみがフォアグラウンド復帰
        assert!(ProcessVisibility::Background.is_foreground_regain(ProcessVisibility::Active));
        assert!(ProcessVisibility::Inactive.is_foreground_regain(ProcessVisibility::Active));
        assert!(!ProcessVisibility::Active.is_foreground_regain(ProcessVisibility::Active));
        assert!(!ProcessVisibility::Active.is_foreground_regain(ProcessVisibility::Background));
    }
}
