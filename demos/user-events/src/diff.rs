//! Field-level change tracking for user updates.

use crate::model::{User, UserUpdate};
use courier_core::event::Changes;

/// Changes `update` would make to `user`.
///
/// Only requested fields whose value differs from the stored one are recorded, so an
/// empty result means the update is a no-op.
#[must_use]
pub fn user_changes(update: &UserUpdate, user: &User) -> Changes {
    let mut changes = Changes::new();
    changes.track("email", &user.email, update.email.as_ref());
    changes.track("first_name", &user.first_name, update.first_name.as_ref());
    changes.track("last_name", &user.last_name, update.last_name.as_ref());
    changes
}
