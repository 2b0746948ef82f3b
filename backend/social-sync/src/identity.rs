//! Identity provider seam. Authentication itself lives outside this crate.

use crate::domain::CurrentUser;
use crate::error::{SocialError, SocialResult};
use parking_lot::RwLock;

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;

    /// `NotAuthenticated` when nobody is signed in
    fn require_user(&self) -> SocialResult<CurrentUser> {
        self.current_user().ok_or(SocialError::NotAuthenticated)
    }
}

/// Identity held in memory, switched by the host on sign-in / sign-out
#[derive(Default)]
pub struct SessionIdentity {
    user: RwLock<Option<CurrentUser>>,
}

impl SessionIdentity {
    pub fn signed_in(user: CurrentUser) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: CurrentUser) {
        *self.user.write() = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user.read().clone()
    }
}
