//! Request-scoped viewer context.

use crate::domain::types::UserId;

/// The user a request is made on behalf of.
///
/// Passed explicitly to every operation that personalizes its result;
/// anonymous requests pass `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
    pub user_id: UserId,
    pub is_administrator: bool,
    pub rating: f64,
}

impl Viewer {
    pub fn new(user_id: UserId, rating: f64) -> Self {
        Self {
            user_id,
            is_administrator: false,
            rating,
        }
    }

    pub fn administrator(user_id: UserId) -> Self {
        Self {
            user_id,
            is_administrator: true,
            rating: 0.0,
        }
    }
}
