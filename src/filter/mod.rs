//! Role-scoped record filtering.
//!
//! Decides which records a viewer may see. Every rule is an exact,
//! case-sensitive comparison on populated fields; a missing field never
//! matches, so malformed records are hidden rather than shown to everyone.

use crate::models::{
    populated, Audience, AudioMessage, FeeRecord, LiveSession, Notification, PaymentRequest,
    RecipientType, Remark, Role, Student, Timetable, Viewer,
};

/// A record that knows who may see it.
pub trait Targeted {
    fn visible_to(&self, viewer: &Viewer) -> bool;
}

/// Borrowing filter: the subset of `records` visible to `viewer`, in order.
pub fn filter_for_viewer<'a, T: Targeted>(records: &'a [T], viewer: &Viewer) -> Vec<&'a T> {
    records.iter().filter(|r| r.visible_to(viewer)).collect()
}

/// Owning filter used by the dashboards. The principal is the authoring
/// role and sees every record unfiltered.
pub fn scope_for_viewer<T: Targeted>(records: Vec<T>, viewer: &Viewer) -> Vec<T> {
    if viewer.role == Role::Principal {
        return records;
    }
    records.into_iter().filter(|r| r.visible_to(viewer)).collect()
}

fn same(record_field: &Option<String>, viewer_field: &Option<String>) -> bool {
    match (populated(record_field), populated(viewer_field)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn same_str(record_field: &str, viewer_field: &Option<String>) -> bool {
    !record_field.is_empty() && populated(viewer_field) == Some(record_field)
}

impl Audience {
    /// Apply the recipient targeting table to `viewer`.
    pub fn admits(&self, viewer: &Viewer) -> bool {
        match self.recipient_type {
            RecipientType::WholeSchool => true,
            RecipientType::AllTeachers => viewer.is_teacher(),
            RecipientType::AllStudents => viewer.is_student(),
            RecipientType::Class => {
                viewer.is_student() && same(&self.recipient_class, &viewer.class)
            }
            RecipientType::Section => {
                viewer.is_student()
                    && same(&self.recipient_class, &viewer.class)
                    && same(&self.recipient_section, &viewer.section)
            }
            RecipientType::IndividualTeacher => viewer.is_teacher() && self.names(viewer),
            RecipientType::IndividualStudent => viewer.is_student() && self.names(viewer),
            RecipientType::Unknown => false,
        }
    }

    /// True when recipientId or recipientName equals any populated viewer identity.
    fn names(&self, viewer: &Viewer) -> bool {
        let targets: Vec<&str> = [&self.recipient_id, &self.recipient_name]
            .into_iter()
            .filter_map(populated)
            .collect();
        viewer.identities().any(|identity| targets.contains(&identity))
    }
}

impl Targeted for Notification {
    fn visible_to(&self, viewer: &Viewer) -> bool {
        self.audience.admits(viewer)
    }
}

impl Targeted for AudioMessage {
    fn visible_to(&self, viewer: &Viewer) -> bool {
        self.audience.admits(viewer)
    }
}

impl Targeted for Remark {
    fn visible_to(&self, viewer: &Viewer) -> bool {
        (viewer.is_teacher() && viewer.has_id(&self.teacher_id)) || self.audience.admits(viewer)
    }
}

impl Targeted for LiveSession {
    fn visible_to(&self, viewer: &Viewer) -> bool {
        match viewer.role {
            Role::Student => {
                self.is_live
                    && same_str(&self.class, &viewer.class)
                    && same_str(&self.section, &viewer.section)
            }
            Role::Teacher => viewer.has_id(&self.teacher_id),
            Role::Principal => false,
        }
    }
}

impl Targeted for FeeRecord {
    fn visible_to(&self, viewer: &Viewer) -> bool {
        viewer.is_student() && viewer.has_id(&self.student_id)
    }
}

impl Targeted for PaymentRequest {
    fn visible_to(&self, viewer: &Viewer) -> bool {
        viewer.is_student() && viewer.has_id(&self.student_id)
    }
}

impl Targeted for Timetable {
    fn visible_to(&self, viewer: &Viewer) -> bool {
        match viewer.role {
            Role::Teacher => true,
            Role::Student => {
                same_str(&self.class, &viewer.class) && same_str(&self.section, &viewer.section)
            }
            Role::Principal => false,
        }
    }
}

impl Targeted for Student {
    fn visible_to(&self, viewer: &Viewer) -> bool {
        match viewer.role {
            Role::Teacher => true,
            Role::Student => {
                viewer.has_id(&self.id)
                    || self
                        .email
                        .as_deref()
                        .is_some_and(|email| same_str(email, &viewer.email))
            }
            Role::Principal => false,
        }
    }
}
