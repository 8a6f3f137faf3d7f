//! Shared domain identifiers and enumerations aligned with persisted values.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Numeric identifier of any stored entity.
pub type EntityId = u64;
pub type BlogId = EntityId;
pub type BlogTypeId = EntityId;
pub type UserId = EntityId;
pub type TopicId = EntityId;

/// Type code of personal blogs, created automatically for each user.
pub const PERSONAL_BLOG_TYPE: &str = "personal";
/// Type code of closed blogs, readable only by members and owners.
pub const CLOSE_BLOG_TYPE: &str = "close";
/// Vote target name used for blogs.
pub const BLOG_VOTE_TARGET: &str = "blog";

/// Role of a user inside a blog, stored as the signed code the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlogRole {
    Ban,
    Reject,
    Invite,
    Guest,
    Member,
    Moderator,
    Administrator,
    Owner,
    NotMember,
}

impl BlogRole {
    pub fn code(self) -> i32 {
        match self {
            BlogRole::Ban => -4,
            BlogRole::Reject => -2,
            BlogRole::Invite => -1,
            BlogRole::Guest => 0,
            BlogRole::Member => 1,
            BlogRole::Moderator => 2,
            BlogRole::Administrator => 4,
            BlogRole::Owner => 8,
            BlogRole::NotMember => 16,
        }
    }

    /// Roles counted as membership when no explicit role is requested.
    pub fn is_member_or_above(self) -> bool {
        matches!(
            self,
            BlogRole::Member | BlogRole::Moderator | BlogRole::Administrator | BlogRole::Owner
        )
    }
}

impl TryFrom<i32> for BlogRole {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -4 => Ok(BlogRole::Ban),
            -2 => Ok(BlogRole::Reject),
            -1 => Ok(BlogRole::Invite),
            0 => Ok(BlogRole::Guest),
            1 => Ok(BlogRole::Member),
            2 => Ok(BlogRole::Moderator),
            4 => Ok(BlogRole::Administrator),
            8 => Ok(BlogRole::Owner),
            16 => Ok(BlogRole::NotMember),
            other => Err(DomainError::validation(format!(
                "unknown blog role code {other}"
            ))),
        }
    }
}

/// Action a viewer wants to perform with a blog type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlogTypeAction {
    Add,
    List,
}

/// Caller-supplied identifier before validation.
///
/// Ids that are zero, negative or not numeric are rejected up front and
/// reported back as [`RequestedId::Invalid`].
pub trait IdInput {
    fn to_requested(&self) -> RequestedId;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestedId {
    Valid(EntityId),
    Invalid(String),
}

impl RequestedId {
    pub fn valid(&self) -> Option<EntityId> {
        match self {
            RequestedId::Valid(id) => Some(*id),
            RequestedId::Invalid(_) => None,
        }
    }
}

impl fmt::Display for RequestedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedId::Valid(id) => write!(f, "{id}"),
            RequestedId::Invalid(raw) => write!(f, "{raw}"),
        }
    }
}

impl IdInput for u64 {
    fn to_requested(&self) -> RequestedId {
        if *self == 0 {
            RequestedId::Invalid(self.to_string())
        } else {
            RequestedId::Valid(*self)
        }
    }
}

impl IdInput for u32 {
    fn to_requested(&self) -> RequestedId {
        u64::from(*self).to_requested()
    }
}

impl IdInput for i64 {
    fn to_requested(&self) -> RequestedId {
        match u64::try_from(*self) {
            Ok(id) if id > 0 => RequestedId::Valid(id),
            _ => RequestedId::Invalid(self.to_string()),
        }
    }
}

impl IdInput for &str {
    fn to_requested(&self) -> RequestedId {
        match self.trim().parse::<i64>() {
            Ok(value) => match value.to_requested() {
                RequestedId::Valid(id) => RequestedId::Valid(id),
                RequestedId::Invalid(_) => RequestedId::Invalid((*self).to_string()),
            },
            Err(_) => RequestedId::Invalid((*self).to_string()),
        }
    }
}

impl IdInput for String {
    fn to_requested(&self) -> RequestedId {
        self.as_str().to_requested()
    }
}

/// Parse a single identifier, rejecting anything that is not a positive integer.
pub fn parse_entity_id<I: IdInput + ?Sized>(raw: &I) -> Result<EntityId, DomainError> {
    match raw.to_requested() {
        RequestedId::Valid(id) => Ok(id),
        RequestedId::Invalid(raw) => Err(DomainError::invalid_id(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_and_non_numeric_ids() {
        assert_eq!(0_u64.to_requested(), RequestedId::Invalid("0".to_string()));
        assert_eq!((-3_i64).to_requested(), RequestedId::Invalid("-3".to_string()));
        assert_eq!("abc".to_requested(), RequestedId::Invalid("abc".to_string()));
        assert_eq!(" 42 ".to_requested(), RequestedId::Valid(42));
        assert_eq!(7_i64.to_requested(), RequestedId::Valid(7));
    }

    #[test]
    fn parse_entity_id_reports_validation_error() {
        let err = parse_entity_id(&"-1").expect_err("negative id must fail");
        assert!(matches!(err, DomainError::InvalidId { .. }));
        assert_eq!(parse_entity_id(&"15").expect("valid id"), 15);
    }

    #[test]
    fn role_codes_round_trip() {
        for role in [
            BlogRole::Ban,
            BlogRole::Reject,
            BlogRole::Invite,
            BlogRole::Guest,
            BlogRole::Member,
            BlogRole::Moderator,
            BlogRole::Administrator,
            BlogRole::Owner,
            BlogRole::NotMember,
        ] {
            assert_eq!(BlogRole::try_from(role.code()).expect("known code"), role);
        }
        assert!(BlogRole::try_from(3).is_err());
        assert!(BlogRole::Member.is_member_or_above());
        assert!(!BlogRole::Invite.is_member_or_above());
        assert!(!BlogRole::NotMember.is_member_or_above());
    }
}
