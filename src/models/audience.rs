//! Recipient scope descriptor carried by broadcast records.

use serde::{Deserialize, Serialize};

/// Who a notification, audio message or remark is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    WholeSchool,
    AllTeachers,
    AllStudents,
    Class,
    Section,
    IndividualTeacher,
    IndividualStudent,
    /// Anything this server does not recognize, including a missing type
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audience {
    #[serde(default)]
    pub recipient_type: RecipientType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
}

impl Audience {
    pub fn of(recipient_type: RecipientType) -> Self {
        Self {
            recipient_type,
            ..Self::default()
        }
    }

    pub fn class(class: &str) -> Self {
        Self {
            recipient_class: Some(class.to_string()),
            ..Self::of(RecipientType::Class)
        }
    }

    pub fn section(class: &str, section: &str) -> Self {
        Self {
            recipient_class: Some(class.to_string()),
            recipient_section: Some(section.to_string()),
            ..Self::of(RecipientType::Section)
        }
    }

    pub fn student(id: &str, name: &str) -> Self {
        Self {
            recipient_id: Some(id.to_string()),
            recipient_name: Some(name.to_string()),
            ..Self::of(RecipientType::IndividualStudent)
        }
    }

    pub fn teacher(id: &str, name: &str) -> Self {
        Self {
            recipient_id: Some(id.to_string()),
            recipient_name: Some(name.to_string()),
            ..Self::of(RecipientType::IndividualTeacher)
        }
    }
}
