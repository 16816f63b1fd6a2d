//! Role-based secondary authorization

use crate::auth::User;
use crate::{Error, Result};

/// Checks claims-embedded role membership on an already-authenticated user.
///
/// Pure function over the verified claims; performs no I/O. Intended as a
/// secondary check after [`crate::auth::OidcAuthorizer`] has run.
#[derive(Debug, Clone)]
pub struct RoleValidator {
    required: Vec<String>,
}

impl RoleValidator {
    /// Create a validator for the given required role set
    pub fn new(required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Verify the user holds at least one of the required roles.
    ///
    /// Returns the roles that matched. Fails with [`Error::InvalidAuth`] if no
    /// user is present, the `roles` claim is not list-shaped, or there is no
    /// overlap with the required set.
    pub fn check(&self, user: Option<&User>) -> Result<Vec<String>> {
        let user = user.ok_or_else(|| Error::invalid_auth("No user attached to request"))?;

        let Some(serde_json::Value::Array(ref roles)) = user.claims.roles else {
            return Err(Error::invalid_auth("Invalid formatted roles claim"));
        };

        let matched: Vec<String> = self
            .required
            .iter()
            .filter(|required| roles.iter().any(|r| r.as_str() == Some(required.as_str())))
            .cloned()
            .collect();

        if matched.is_empty() {
            return Err(Error::invalid_auth("Insufficient permissions"));
        }

        Ok(matched)
    }
}
