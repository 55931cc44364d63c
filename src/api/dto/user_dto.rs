//! Contact management DTOs.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::service::NewContact;

/// Request body for `POST /users/emergency-contacts`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddContactRequest {
    /// Display name.
    pub name: String,
    /// Phone number texted on trigger.
    pub phone: String,
    /// Free-form relationship label.
    #[serde(default)]
    pub relationship: Option<String>,
    /// Notification priority, lower first. Defaults to 1.
    #[serde(default)]
    pub priority_order: Option<i32>,
}

impl From<AddContactRequest> for NewContact {
    fn from(req: AddContactRequest) -> Self {
        Self {
            name: req.name,
            phone: req.phone,
            relationship: req.relationship,
            priority_order: req.priority_order,
        }
    }
}
