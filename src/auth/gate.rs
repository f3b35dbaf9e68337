//! Coarse-grained authorization: administrator vs standard user.

use crate::auth::error::AuthError;
use crate::auth::principal::Principal;

/// Group whose members may manage other accounts.
pub const ADMIN_GROUP: &str = "admin";

/// Whether `principal` is an administrator.
pub fn is_privileged(principal: &Principal) -> bool {
    principal.in_group(ADMIN_GROUP)
}

/// Gate for privileged operations. Fails with `Forbidden`, never with an
/// authentication error: the caller is known, just not entitled.
pub fn require_admin(principal: &Principal) -> Result<(), AuthError> {
    if is_privileged(principal) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}
