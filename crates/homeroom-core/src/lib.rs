#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Returns the project code name.
#[must_use]
pub const fn project_name() -> &'static str {
    "homeroom"
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("user id is invalid")]
    InvalidUserId,
    #[error("display name is invalid")]
    InvalidDisplayName,
    #[error("message body is invalid")]
    InvalidMessageBody,
    #[error("message kind is invalid")]
    InvalidMessageKind,
}

/// Stable user identifier minted by the portal's credential service.
///
/// The gateway never creates these; it only carries them through presence,
/// routing, and the message log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_user_id(&value)?;
        Ok(Self(value))
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DisplayName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_display_name(&value)?;
        Ok(Self(value))
    }
}

impl core::fmt::Display for DisplayName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody(String);

impl MessageBody {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MessageBody {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_message_body(&value)?;
        Ok(Self(value))
    }
}

/// Payload tag on a message. Free-form but constrained to a small
/// identifier alphabet; `text` when the client sends nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageKind(String);

impl MessageKind {
    #[must_use]
    pub fn text() -> Self {
        Self(String::from("text"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::text()
    }
}

impl TryFrom<String> for MessageKind {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_message_kind(&value)?;
        Ok(Self(value))
    }
}

impl From<MessageKind> for String {
    fn from(value: MessageKind) -> Self {
        value.0
    }
}

fn validate_user_id(value: &str) -> Result<(), DomainError> {
    if !(1..=64).contains(&value.len()) {
        return Err(DomainError::InvalidUserId);
    }

    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Ok(());
    }

    Err(DomainError::InvalidUserId)
}

fn validate_display_name(value: &str) -> Result<(), DomainError> {
    if !(1..=128).contains(&value.len()) {
        return Err(DomainError::InvalidDisplayName);
    }
    if value.trim().is_empty() {
        return Err(DomainError::InvalidDisplayName);
    }

    if value.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Ok(());
    }

    Err(DomainError::InvalidDisplayName)
}

fn validate_message_body(value: &str) -> Result<(), DomainError> {
    if (1..=2000).contains(&value.len()) {
        Ok(())
    } else {
        Err(DomainError::InvalidMessageBody)
    }
}

fn validate_message_kind(value: &str) -> Result<(), DomainError> {
    if !(1..=32).contains(&value.len()) {
        return Err(DomainError::InvalidMessageKind);
    }

    if value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Ok(());
    }

    Err(DomainError::InvalidMessageKind)
}

#[cfg(test)]
mod tests {
    use super::{project_name, DisplayName, DomainError, MessageBody, MessageKind, UserId};

    #[test]
    fn project_name_is_stable() {
        assert_eq!(project_name(), "homeroom");
    }

    #[test]
    fn user_id_invariants_enforced() {
        let valid = UserId::try_from(String::from("student-4021")).unwrap();
        assert_eq!(valid.as_str(), "student-4021");
        assert_eq!(
            UserId::try_from(String::new()).unwrap_err(),
            DomainError::InvalidUserId
        );
        assert_eq!(
            UserId::try_from(String::from("has spaces")).unwrap_err(),
            DomainError::InvalidUserId
        );
        assert_eq!(
            UserId::try_from("x".repeat(65)).unwrap_err(),
            DomainError::InvalidUserId
        );
    }

    #[test]
    fn display_name_invariants_enforced() {
        let valid = DisplayName::try_from(String::from("Priya Sharma")).unwrap();
        assert_eq!(valid.as_str(), "Priya Sharma");
        assert_eq!(
            DisplayName::try_from(String::from("   ")).unwrap_err(),
            DomainError::InvalidDisplayName
        );
        assert_eq!(
            DisplayName::try_from(String::from("bad\u{7}name")).unwrap_err(),
            DomainError::InvalidDisplayName
        );
        assert_eq!(
            DisplayName::try_from("n".repeat(129)).unwrap_err(),
            DomainError::InvalidDisplayName
        );
    }

    #[test]
    fn message_body_enforces_length_bounds() {
        assert!(MessageBody::try_from(String::from("hi")).is_ok());
        assert!(MessageBody::try_from("b".repeat(2000)).is_ok());
        assert_eq!(
            MessageBody::try_from(String::new()).unwrap_err(),
            DomainError::InvalidMessageBody
        );
        assert_eq!(
            MessageBody::try_from("b".repeat(2001)).unwrap_err(),
            DomainError::InvalidMessageBody
        );
    }

    #[test]
    fn message_kind_defaults_to_text_and_enforces_alphabet() {
        assert_eq!(MessageKind::default().as_str(), "text");
        let attachment = MessageKind::try_from(String::from("attachment_ref")).unwrap();
        assert_eq!(attachment.as_str(), "attachment_ref");
        assert_eq!(
            MessageKind::try_from(String::from("Not-Valid")).unwrap_err(),
            DomainError::InvalidMessageKind
        );
        assert_eq!(
            MessageKind::try_from(String::new()).unwrap_err(),
            DomainError::InvalidMessageKind
        );
    }
}
