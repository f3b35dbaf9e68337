//! Bearer token authentication and authorization.
//!
//! Every protected request carries `Authorization: Bearer <token>`, a JWT
//! issued by a Cognito user pool. The pieces, leaf first:
//!
//! - **jwks**: fetches the pool's signing keys and caches them per key id
//!   (10 minute TTL, 5 entries).
//! - **verifier**: strict (RS256 signature + claims) or permissive
//!   (expiry/issuer + directory existence) verification.
//! - **principal**: verified claims to a [`Principal`].
//! - **gate**: administrator vs standard user.
//! - **extractor**: the [`Authenticator`] that runs all of the above for one
//!   header value and reduces every failure to an [`AuthError`].
//!
//! ## Security Model
//!
//! - Failures are fail-closed: an unreachable JWKS endpoint or directory
//!   rejects the request with 401, never 5xx.
//! - The mode is fixed at startup; a strict failure is never retried
//!   permissively.
//! - Response bodies carry a fixed message per error kind. Detail goes to the
//!   log only.
//!
//! ## Usage
//!
//! ```ignore
//! let auth = Authenticator::from_config(&config, directory)?;
//! let principal = auth.authenticate(headers.get("authorization")).await?;
//! gate::require_admin(&principal)?;
//! ```

pub mod clock;
mod error;
mod extractor;
pub mod gate;
pub mod jwks;
mod principal;
mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AuthError, Claim, FORBIDDEN_MESSAGE, INVALID_TOKEN_MESSAGE, MISSING_HEADER_MESSAGE};
pub use extractor::{AuthConfig, AuthConfigError, Authenticator};
pub use gate::{ADMIN_GROUP, is_privileged, require_admin};
pub use jwks::{JwksKeySource, KeyResolveError, KeyResolver, KeySource};
pub use principal::{Principal, TokenClaims};
pub use verifier::{AuthMode, PermissiveVerifier, StrictVerifier, Verifier, unverified_claims};
