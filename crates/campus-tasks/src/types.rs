use std::num::NonZeroU32;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string that does not name any variant of one of the task enums.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Calendar unit a repeat interval is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Frequency {
    Days,
    Weeks,
    Months,
    Years,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Days => "days",
            Frequency::Weeks => "weeks",
            Frequency::Months => "months",
            Frequency::Years => "years",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Frequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "days" => Ok(Frequency::Days),
            "weeks" => Ok(Frequency::Weeks),
            "months" => Ok(Frequency::Months),
            "years" => Ok(Frequency::Years),
            _ => Err(UnknownVariant {
                kind: "repeat frequency",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = UnknownVariant;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// When a repeating series stops generating occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EndCondition {
    /// Repeat indefinitely.
    #[default]
    #[serde(alias = "Never")]
    None,
    /// Stop once the series has generated this many occurrences.
    After(u32),
    /// Stop once the next occurrence would fall after the end of this day.
    OnDate(#[serde(with = "due_date_format")] NaiveDate),
}

fn default_interval() -> NonZeroU32 {
    NonZeroU32::MIN
}

/// Repeat rule attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RepeatConfig {
    /// One-off task, or a retired occurrence of a series.
    #[default]
    None,
    /// Every `interval` `frequency` units, counted from the current due instant.
    Custom {
        #[serde(default = "default_interval")]
        interval: NonZeroU32,
        frequency: Frequency,
        #[serde(rename = "endCondition", default)]
        end_condition: EndCondition,
    },
}

impl RepeatConfig {
    pub fn is_custom(&self) -> bool {
        matches!(self, RepeatConfig::Custom { .. })
    }
}

/// Lifecycle state of a task occurrence. Owned by the CRUD layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Overdue,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Overdue => "Overdue",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Not Started" => Ok(TaskStatus::NotStarted),
            "In Progress" => Ok(TaskStatus::InProgress),
            "Completed" => Ok(TaskStatus::Completed),
            "Overdue" => Ok(TaskStatus::Overdue),
            other => Err(UnknownVariant {
                kind: "task status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Priority::Low),
            "Medium" => Ok(Priority::Medium),
            "High" => Ok(Priority::High),
            other => Err(UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// A file uploaded against a task. Storage layout lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub path: String,
}

/// A persisted task occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Opaque unique identifier, primary key.
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(with = "due_date_format")]
    pub due_date: NaiveDate,
    #[serde(with = "due_time_format")]
    pub due_time: NaiveTime,
    pub priority: Priority,
    pub status: TaskStatus,
    /// RFC 3339 timestamp of row creation.
    pub created_at: String,
    pub attachment_required: bool,
    pub text_submission_required: bool,
    pub submission_text: String,
    pub assigned_to: Vec<String>,
    pub tagged_members: Vec<String>,
    pub repeat_config: RepeatConfig,
    /// Number of occurrences generated before this one in its series.
    pub occurrence_count: u32,
    pub attachments: Vec<Attachment>,
    /// First task of the series, or `None` when this task is the first.
    pub generator_task_id: Option<String>,
}

impl Task {
    /// The instant this occurrence is due, as wall-clock time in the reference timezone.
    pub fn due_at(&self) -> NaiveDateTime {
        self.due_date.and_time(self.due_time)
    }

    /// ID of the series this task belongs to (the first task's ID).
    pub fn series_id(&self) -> &str {
        self.generator_task_id.as_deref().unwrap_or(&self.id)
    }
}

/// Request body for creating a task. Missing fields take the API defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "due_date_format")]
    pub due_date: NaiveDate,
    #[serde(with = "due_time_format", default = "default_due_time")]
    pub due_time: NaiveTime,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub attachment_required: bool,
    #[serde(default)]
    pub text_submission_required: bool,
    #[serde(default)]
    pub submission_text: String,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub tagged_members: Vec<String>,
    #[serde(default)]
    pub repeat_config: RepeatConfig,
    #[serde(default)]
    pub occurrence_count: u32,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

fn default_title() -> String {
    "Untitled Task".to_string()
}

fn default_due_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

impl NewTask {
    /// Materialise the request as the first task of its (possibly one-task) series.
    pub fn into_task(self, created_at: String) -> Task {
        Task {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            due_time: self.due_time,
            priority: self.priority,
            status: self.status,
            created_at,
            attachment_required: self.attachment_required,
            text_submission_required: self.text_submission_required,
            submission_text: self.submission_text,
            assigned_to: self.assigned_to,
            tagged_members: self.tagged_members,
            repeat_config: self.repeat_config,
            occurrence_count: self.occurrence_count,
            attachments: self.attachments,
            generator_task_id: None,
        }
    }
}

/// Partial update: only the fields present are changed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, with = "opt_due_date_format")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, with = "opt_due_time_format")]
    pub due_time: Option<NaiveTime>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub attachment_required: Option<bool>,
    pub text_submission_required: Option<bool>,
    pub submission_text: Option<String>,
    pub assigned_to: Option<Vec<String>>,
    pub tagged_members: Option<Vec<String>>,
    pub repeat_config: Option<RepeatConfig>,
    pub occurrence_count: Option<u32>,
    pub attachments: Option<Vec<Attachment>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.due_time.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.attachment_required.is_none()
            && self.text_submission_required.is_none()
            && self.submission_text.is_none()
            && self.assigned_to.is_none()
            && self.tagged_members.is_none()
            && self.repeat_config.is_none()
            && self.occurrence_count.is_none()
            && self.attachments.is_none()
    }

    pub fn apply_to(self, task: &mut Task) {
        if let Some(v) = self.title {
            task.title = v;
        }
        if let Some(v) = self.description {
            task.description = v;
        }
        if let Some(v) = self.due_date {
            task.due_date = v;
        }
        if let Some(v) = self.due_time {
            task.due_time = v;
        }
        if let Some(v) = self.priority {
            task.priority = v;
        }
        if let Some(v) = self.status {
            task.status = v;
        }
        if let Some(v) = self.attachment_required {
            task.attachment_required = v;
        }
        if let Some(v) = self.text_submission_required {
            task.text_submission_required = v;
        }
        if let Some(v) = self.submission_text {
            task.submission_text = v;
        }
        if let Some(v) = self.assigned_to {
            task.assigned_to = v;
        }
        if let Some(v) = self.tagged_members {
            task.tagged_members = v;
        }
        if let Some(v) = self.repeat_config {
            task.repeat_config = v;
        }
        if let Some(v) = self.occurrence_count {
            task.occurrence_count = v;
        }
        if let Some(v) = self.attachments {
            task.attachments = v;
        }
    }
}

/// Parse a due date. Full ISO timestamps are accepted; only the date part is kept.
pub fn parse_due_date(s: &str) -> std::result::Result<NaiveDate, chrono::ParseError> {
    let date_part = s.split('T').next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part.trim(), "%Y-%m-%d")
}

/// Parse a due time written as `HH:MM:SS` or `HH:MM`.
pub fn parse_due_time(s: &str) -> std::result::Result<NaiveTime, chrono::ParseError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
}

pub fn format_due_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_due_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

mod due_date_format {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_due_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_due_date(&raw).map_err(de::Error::custom)
    }
}

mod due_time_format {
    use chrono::{NaiveTime, Timelike};
    use serde::{de, Deserialize, Deserializer, Serializer};

    // HH:MM on the wire unless the seconds carry information.
    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        if time.second() == 0 {
            s.serialize_str(&time.format("%H:%M").to_string())
        } else {
            s.serialize_str(&super::format_due_time(*time))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_due_time(&raw).map_err(de::Error::custom)
    }
}

mod opt_due_date_format {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| super::parse_due_date(&raw).map_err(de::Error::custom))
            .transpose()
    }
}

mod opt_due_time_format {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| super::parse_due_time(&raw).map_err(de::Error::custom))
            .transpose()
    }
}
