//! Data models for the Royal Academy portal.
//!
//! Records are stored as JSON documents under well-known keys. Field names
//! are camelCase on the wire so browser dashboards can read them directly.

mod audience;
mod document;
mod fees;
mod live;
mod messages;
mod roster;
mod viewer;

pub use audience::*;
pub use document::*;
pub use fees::*;
pub use live::*;
pub use messages::*;
pub use roster::*;
pub use viewer::*;

/// Well-known document keys.
pub mod keys {
    pub const LIVE_SESSIONS: &str = "royal-academy-live-sessions";
    pub const NOTIFICATIONS: &str = "royal-academy-notifications";
    pub const AUDIO_MESSAGES: &str = "royal-academy-audio-messages";
    pub const REMARKS: &str = "royal-academy-remarks";
    pub const FEE_RECORDS: &str = "royal-academy-fee-records";
    pub const PAYMENT_REQUESTS: &str = "royal-academy-payment-requests";
    pub const STUDENTS: &str = "royal-academy-students";
    pub const TIMETABLES: &str = "royal-academy-timetables";

    /// Key holding the presence list for one live session.
    pub fn viewers(session_id: &str) -> String {
        format!("viewers:{}", session_id)
    }
}
