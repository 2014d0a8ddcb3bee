//! Identity of the signed-in dashboard user.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Principal,
    Teacher,
    Student,
}

/// The viewer a dashboard is rendered for.
///
/// Supplied by the routing/auth shell and treated as trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub role: Role,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
}

impl Viewer {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            id: None,
            email: None,
            name: None,
            class: None,
            section: None,
        }
    }

    pub fn student(id: &str, class: &str, section: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            class: Some(class.to_string()),
            section: Some(section.to_string()),
            ..Self::new(Role::Student)
        }
    }

    pub fn teacher(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::new(Role::Teacher)
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    /// Populated identity fields, in id, email, name order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        [&self.id, &self.email, &self.name]
            .into_iter()
            .filter_map(|field| populated(field))
    }

    /// True when `id` equals the viewer's populated id.
    pub fn has_id(&self, id: &str) -> bool {
        populated(&self.id) == Some(id)
    }
}

/// A field counts only when it is present and non-empty.
pub(crate) fn populated(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}
