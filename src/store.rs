use crate::errors::AppError;
use crate::models::{
    ActivitySuggestion, AddedSuggestion, InTownOutcome, NewVisit, PlanVisitRequest,
    ProfileRequest, SuggestionRequest, SuggestionView, User, Visit, VisitStatus, VisitView,
};
use crate::queries::{current_visit_for_user, display_name};
use crate::storage::Storage;
use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const IN_TOWN_NOTE: &str = "Currently in town!";

/// In-memory directory state mirrored to `Storage` after every mutation.
#[derive(Debug)]
pub struct Store {
    storage: Storage,
    users: Vec<User>,
    visits: Vec<Visit>,
    suggestions: Vec<ActivitySuggestion>,
    current_user: Option<User>,
}

impl Store {
    pub async fn open(storage: Storage) -> Self {
        let users = storage.load_records::<User>().await;
        let visits = storage.load_records::<Visit>().await;
        let suggestions = storage.load_records::<ActivitySuggestion>().await;
        let current_user = storage.load_current_user().await;
        info!(
            users = users.len(),
            visits = visits.len(),
            suggestions = suggestions.len(),
            signed_in = current_user.is_some(),
            "loaded directory state from {}",
            storage.dir().display()
        );

        Self {
            storage,
            users,
            visits,
            suggestions,
            current_user,
        }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn visits(&self) -> &[Visit] {
        &self.visits
    }

    pub fn suggestions(&self) -> &[ActivitySuggestion] {
        &self.suggestions
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    /// Creates the current user, or updates it in place when one is signed in.
    ///
    /// Memory is only updated once both blobs are written; a failed session
    /// write puts the previous `users` blob back.
    pub async fn register(&mut self, profile: ProfileRequest) -> Result<User, AppError> {
        let name = profile.name.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("name is required"));
        }

        let (id, joined_at) = match &self.current_user {
            Some(existing) => (existing.id.clone(), existing.joined_at),
            None => (new_id(), Some(Utc::now())),
        };
        let user = User {
            id,
            name: name.to_string(),
            organizations: normalize_organizations(profile.organizations),
            bio: non_blank(profile.bio),
            city: non_blank(profile.city),
            occupation: non_blank(profile.occupation),
            joined_at,
        };

        let mut users = self.users.clone();
        let updated = match users.iter_mut().find(|entry| entry.id == user.id) {
            Some(entry) => {
                *entry = user.clone();
                true
            }
            None => {
                users.push(user.clone());
                false
            }
        };

        self.storage.save_records(&users).await?;
        if let Err(err) = self.storage.save_current_user(Some(&user)).await {
            self.restore_users().await;
            return Err(err);
        }

        self.users = users;
        self.current_user = Some(user.clone());
        if updated {
            info!(user_id = %user.id, "updated profile");
        } else {
            info!(user_id = %user.id, "registered user");
        }
        Ok(user)
    }

    /// Signs the current user out; the directory keeps their entry.
    pub async fn clear_session(&mut self) -> Result<Option<User>, AppError> {
        if self.current_user.is_none() {
            return Ok(None);
        }

        self.storage.save_current_user(None).await?;
        let user = self.current_user.take();
        if let Some(user) = &user {
            info!(user_id = %user.id, "cleared session");
        }
        Ok(user)
    }

    /// Signs the current user out and removes them from the directory.
    pub async fn leave_directory(&mut self) -> Result<Option<User>, AppError> {
        let Some(user_id) = self.current_user.as_ref().map(|user| user.id.clone()) else {
            return Ok(None);
        };

        let users: Vec<User> = self
            .users
            .iter()
            .filter(|entry| entry.id != user_id)
            .cloned()
            .collect();
        self.storage.save_records(&users).await?;
        if let Err(err) = self.storage.save_current_user(None).await {
            self.restore_users().await;
            return Err(err);
        }

        self.users = users;
        info!(user_id = %user_id, "left directory");
        Ok(self.current_user.take())
    }

    async fn restore_users(&self) {
        if let Err(err) = self.storage.save_records(&self.users).await {
            error!("failed to restore users blob: {}", err.message);
        }
    }

    pub async fn add_visit(&mut self, data: NewVisit) -> Result<Visit, AppError> {
        let visit = Visit {
            id: new_id(),
            user_id: data.user_id,
            start_date: data.start_date,
            end_date: data.end_date,
            status: data.status,
            notes: data.notes,
        };

        let mut visits = self.visits.clone();
        visits.push(visit.clone());
        self.storage.save_records(&visits).await?;
        self.visits = visits;
        info!(visit_id = %visit.id, user_id = %visit.user_id, status = visit.status.as_str(), "added visit");
        Ok(visit)
    }

    /// Returns `None` without touching storage when `visit_id` is unknown.
    pub async fn update_visit_status(
        &mut self,
        visit_id: &str,
        status: VisitStatus,
    ) -> Result<Option<Visit>, AppError> {
        let Some(index) = self.visits.iter().position(|visit| visit.id == visit_id) else {
            debug!(visit_id, "status update for unknown visit");
            return Ok(None);
        };

        let mut visits = self.visits.clone();
        let Some(visit) = visits.get_mut(index) else {
            return Ok(None);
        };
        visit.status = status;
        let updated = visit.clone();

        self.storage.save_records(&visits).await?;
        self.visits = visits;
        info!(visit_id, status = status.as_str(), "updated visit status");
        Ok(Some(updated))
    }

    /// Toggles presence: demotes an existing current visit, or opens a new one.
    pub async fn mark_in_town(&mut self, user_id: &str) -> Result<InTownOutcome, AppError> {
        if let Some(current) = current_visit_for_user(&self.visits, user_id) {
            let visit_id = current.id.clone();
            return match self.update_visit_status(&visit_id, VisitStatus::Planned).await? {
                Some(visit) => Ok(InTownOutcome::Left(visit)),
                None => Err(AppError::not_found(format!("visit {visit_id} vanished"))),
            };
        }

        let visit = self
            .add_visit(NewVisit {
                user_id: user_id.to_string(),
                start_date: Utc::now(),
                end_date: None,
                status: VisitStatus::Current,
                notes: Some(IN_TOWN_NOTE.to_string()),
            })
            .await?;
        Ok(InTownOutcome::Arrived(visit))
    }

    pub async fn plan_visit(
        &mut self,
        user_id: &str,
        plan: PlanVisitRequest,
    ) -> Result<Visit, AppError> {
        let Some(start) = plan.start_date else {
            return Err(AppError::bad_request("start date is required"));
        };
        if plan.end_date.is_some_and(|end| end < start) {
            return Err(AppError::bad_request("end date is before start date"));
        }

        self.add_visit(NewVisit {
            user_id: user_id.to_string(),
            start_date: start_of_day(start),
            end_date: plan.end_date.map(start_of_day),
            status: VisitStatus::Planned,
            notes: non_blank(plan.notes),
        })
        .await
    }

    /// Appends a suggestion. A dangling `visit_id` is accepted and reported back.
    pub async fn add_suggestion(
        &mut self,
        user_id: &str,
        request: SuggestionRequest,
    ) -> Result<AddedSuggestion, AppError> {
        let title = request.title.trim();
        let description = request.description.trim();
        if title.is_empty() || description.is_empty() {
            return Err(AppError::bad_request("title and description are required"));
        }

        let suggestion = ActivitySuggestion {
            id: new_id(),
            user_id: user_id.to_string(),
            visit_id: request.visit_id,
            title: title.to_string(),
            description: description.to_string(),
            suggested_date: request.suggested_date.map(start_of_day),
            created_at: Utc::now(),
        };

        let visit_found = self.visits.iter().any(|visit| visit.id == suggestion.visit_id);
        if !visit_found {
            warn!(visit_id = %suggestion.visit_id, "suggestion targets an unknown visit");
        }

        let mut suggestions = self.suggestions.clone();
        suggestions.push(suggestion.clone());
        self.storage.save_records(&suggestions).await?;
        self.suggestions = suggestions;
        info!(suggestion_id = %suggestion.id, visit_id = %suggestion.visit_id, "added suggestion");
        Ok(AddedSuggestion {
            suggestion,
            visit_found,
        })
    }

    pub fn visit_view(&self, visit: &Visit) -> VisitView {
        VisitView {
            visit: visit.clone(),
            user_name: display_name(&self.users, &visit.user_id).map(str::to_string),
        }
    }

    pub fn suggestion_view(&self, suggestion: &ActivitySuggestion) -> SuggestionView {
        SuggestionView {
            suggestion: suggestion.clone(),
            user_name: display_name(&self.users, &suggestion.user_id).map(str::to_string),
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn start_of_day(date: NaiveDate) -> chrono::DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Trims entries, drops blanks and exact duplicates, keeps first-seen order.
pub fn normalize_organizations(organizations: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(organizations.len());
    for org in organizations {
        let org = org.trim();
        if !org.is_empty() && !normalized.iter().any(|existing| existing == org) {
            normalized.push(org.to_string());
        }
    }
    normalized
}
