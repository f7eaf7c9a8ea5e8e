use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitStatus {
    Current,
    Planned,
}

impl VisitStatus {
    pub fn is_active(self) -> bool {
        matches!(self, VisitStatus::Current | VisitStatus::Planned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VisitStatus::Current => "current",
            VisitStatus::Planned => "planned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: String,
    pub user_id: String,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySuggestion {
    pub id: String,
    pub user_id: String,
    pub visit_id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Profile form submitted on registration or profile edit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub name: String,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
}

/// Visit data as handed to `Store::add_visit`; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub user_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanVisitRequest {
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: VisitStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub visit_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub suggested_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitsQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    City,
    #[default]
    Organization,
}

#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    #[serde(default)]
    pub by: GroupKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitView {
    #[serde(flatten)]
    pub visit: Visit,
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionView {
    #[serde(flatten)]
    pub suggestion: ActivitySuggestion,
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedSuggestion {
    pub suggestion: ActivitySuggestion,
    pub visit_found: bool,
}

#[derive(Debug, Serialize)]
pub struct UserGroup {
    pub key: String,
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", content = "visit", rename_all = "lowercase")]
pub enum InTownOutcome {
    Arrived(Visit),
    Left(Visit),
}
