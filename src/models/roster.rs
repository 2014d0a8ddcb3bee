//! School roster and timetable records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub class: String,
    pub section: String,
    #[serde(default)]
    pub roll_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub day: String,
    pub period: u8,
    pub subject: String,
    #[serde(default)]
    pub teacher: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timetable {
    pub id: String,
    pub class: String,
    pub section: String,
    #[serde(default)]
    pub entries: Vec<TimetableEntry>,
}
