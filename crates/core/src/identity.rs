//! Who is acting, and who owns what.

use crate::FormulationResult;
use mixlab_types::{EmailAddress, NonEmptyText};
use serde::{Deserialize, Serialize};

/// The authenticated user performing an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: NonEmptyText,
    pub display_name: String,
    pub email: Option<EmailAddress>,
}

impl Actor {
    /// Builds an actor from raw strings.
    ///
    /// A blank display name is allowed; a blank or missing email becomes `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if `user_id` is blank or `email` is present but malformed.
    pub fn new(user_id: &str, display_name: &str, email: Option<&str>) -> FormulationResult<Self> {
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(EmailAddress::parse)
            .transpose()?;

        Ok(Self {
            user_id: NonEmptyText::new(user_id)?,
            display_name: display_name.trim().to_string(),
            email,
        })
    }

    pub fn id(&self) -> &str {
        self.user_id.as_str()
    }

    /// True if this actor owns the formulation described by `owner`.
    pub fn owns(&self, owner: &Owner) -> bool {
        owner.id == self.user_id.as_str()
    }

    pub fn as_owner(&self) -> Owner {
        Owner {
            id: self.user_id.as_str().to_string(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Ownership recorded on a formulation.
///
/// `display_name` is captured at creation time and is not kept in sync with later profile
/// changes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub display_name: String,
}
