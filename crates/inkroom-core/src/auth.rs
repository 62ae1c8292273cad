//! Current-user lookup.

use crate::model::UserId;
use serde::{Deserialize, Serialize};

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub uid: UserId,
    pub email: String,
}

impl CurrentUser {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: UserId::new(uid),
            email: email.into(),
        }
    }
}

/// Source of the current user. Sign-in flows live outside the canvas core.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
}

/// Fixed identity, for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user: Option<CurrentUser>,
}

impl StaticAuth {
    pub fn signed_in(user: CurrentUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user.clone()
    }
}
