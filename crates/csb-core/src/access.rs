use crate::{domain::UserId, errors::Error, Result};

/// Immutable admin-identity set, fixed for the process lifetime.
///
/// Every mutating entry point goes through [`AccessController::ensure_admin`].
/// Reading a category through a valid link is deliberately ungated: links are
/// the distribution mechanism for non-admins.
#[derive(Clone, Debug)]
pub struct AccessController {
    admins: Vec<i64>,
}

impl AccessController {
    pub fn new(admin_ids: Vec<i64>) -> Self {
        Self { admins: admin_ids }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user.0)
    }

    pub fn ensure_admin(&self, user: UserId) -> Result<()> {
        if self.is_admin(user) {
            return Ok(());
        }
        Err(Error::Authorization(format!(
            "user {} is not an admin",
            user.0
        )))
    }
}
