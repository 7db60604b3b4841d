//! Bearer credential checks.
//!
//! A terminal ships to shops; whatever it holds must be a per-user or
//! public key. Server-side secrets are refused before any request is made.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::warn;

use crate::error::{GatewayError, GatewayResult};

/// Role markers that identify server-side credentials.
pub const PRIVILEGED_ROLES: &[&str] = &["service_role", "supabase_admin"];

#[derive(Debug, Deserialize)]
struct RoleClaims {
    #[serde(default)]
    role: Option<String>,
}

/// Validates a credential before it is used for any call.
///
/// - empty → [`GatewayError::MissingCredentials`]
/// - contains a privileged marker, or is a JWT whose `role` claim is
///   privileged → [`GatewayError::PrivilegedCredential`]
///
/// Opaque (non-JWT) keys without a marker are accepted.
pub fn check_credential(credential: &str) -> GatewayResult<()> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(GatewayError::MissingCredentials);
    }

    if let Some(marker) = PRIVILEGED_ROLES.iter().find(|m| credential.contains(**m)) {
        warn!(role = marker, "Privileged credential refused");
        return Err(GatewayError::PrivilegedCredential {
            role: marker.to_string(),
        });
    }

    if let Some(role) = jwt_role(credential) {
        if PRIVILEGED_ROLES.contains(&role.as_str()) {
            warn!(role = %role, "Privileged credential refused");
            return Err(GatewayError::PrivilegedCredential { role });
        }
    }

    Ok(())
}

/// Reads the `role` claim without verifying the signature.
///
/// The terminal does not know the signing secret; the backend verifies.
fn jwt_role(token: &str) -> Option<String> {
    if token.split('.').count() != 3 {
        return None;
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<RoleClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.role)
}
