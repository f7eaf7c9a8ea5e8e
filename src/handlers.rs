use crate::errors::AppError;
use crate::models::{
    AddedSuggestion, GroupKey, GroupQuery, InTownOutcome, PlanVisitRequest, ProfileRequest,
    StatusRequest, SuggestionRequest, SuggestionView, User, UserGroup, VisitView, VisitsQuery,
};
use crate::queries::{
    active_visits, group_by_city, group_by_organization, suggestions_for_visit, to_user_groups,
    visits_for_user,
};
use crate::state::AppState;
use crate::store::Store;
use crate::ui::render_index;
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    response::{Html, Redirect},
};
use chrono::NaiveDate;
use serde::Deserialize;

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Html<String> {
    let store = state.store.lock().await;
    Html(render_index(&store, query.by))
}

pub async fn get_session(State(state): State<AppState>) -> Json<Option<User>> {
    let store = state.store.lock().await;
    Json(store.current_user().cloned())
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<ProfileRequest>,
) -> Result<Json<User>, AppError> {
    let mut store = state.store.lock().await;
    let user = store.register(payload).await?;
    Ok(Json(user))
}

pub async fn logout(State(state): State<AppState>) -> Result<Json<Option<User>>, AppError> {
    let mut store = state.store.lock().await;
    Ok(Json(store.clear_session().await?))
}

pub async fn leave(State(state): State<AppState>) -> Result<Json<Option<User>>, AppError> {
    let mut store = state.store.lock().await;
    Ok(Json(store.leave_directory().await?))
}

pub async fn list_users(State(state): State<AppState>) -> Json<Vec<User>> {
    let store = state.store.lock().await;
    Json(store.users().to_vec())
}

pub async fn grouped_users(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Json<Vec<UserGroup>> {
    let store = state.store.lock().await;
    let groups = match query.by {
        GroupKey::City => group_by_city(store.users()),
        GroupKey::Organization => group_by_organization(store.users()),
    };
    Json(to_user_groups(groups))
}

pub async fn list_visits(
    State(state): State<AppState>,
    Query(query): Query<VisitsQuery>,
) -> Json<Vec<VisitView>> {
    let store = state.store.lock().await;
    let views = match query.user_id.as_deref() {
        Some(user_id) => visits_for_user(store.visits(), user_id)
            .into_iter()
            .map(|visit| store.visit_view(visit))
            .collect(),
        None => store
            .visits()
            .iter()
            .map(|visit| store.visit_view(visit))
            .collect(),
    };
    Json(views)
}

pub async fn list_active_visits(State(state): State<AppState>) -> Json<Vec<VisitView>> {
    let store = state.store.lock().await;
    Json(
        active_visits(store.visits())
            .into_iter()
            .map(|visit| store.visit_view(visit))
            .collect(),
    )
}

pub async fn plan_visit(
    State(state): State<AppState>,
    Json(payload): Json<PlanVisitRequest>,
) -> Result<Json<VisitView>, AppError> {
    let mut store = state.store.lock().await;
    let user_id = current_user_id(&store)?;
    let visit = store.plan_visit(&user_id, payload).await?;
    Ok(Json(store.visit_view(&visit)))
}

pub async fn mark_in_town(State(state): State<AppState>) -> Result<Json<InTownOutcome>, AppError> {
    let mut store = state.store.lock().await;
    let user_id = current_user_id(&store)?;
    Ok(Json(store.mark_in_town(&user_id).await?))
}

pub async fn update_visit_status(
    State(state): State<AppState>,
    Path(visit_id): Path<String>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<VisitView>, AppError> {
    let mut store = state.store.lock().await;
    match store.update_visit_status(&visit_id, payload.status).await? {
        Some(visit) => Ok(Json(store.visit_view(&visit))),
        None => Err(AppError::not_found(format!("no visit with id {visit_id}"))),
    }
}

pub async fn visit_suggestions(
    State(state): State<AppState>,
    Path(visit_id): Path<String>,
) -> Json<Vec<SuggestionView>> {
    let store = state.store.lock().await;
    Json(
        suggestions_for_visit(store.suggestions(), &visit_id)
            .into_iter()
            .map(|suggestion| store.suggestion_view(suggestion))
            .collect(),
    )
}

pub async fn add_suggestion(
    State(state): State<AppState>,
    Json(payload): Json<SuggestionRequest>,
) -> Result<Json<AddedSuggestion>, AppError> {
    let mut store = state.store.lock().await;
    let user_id = current_user_id(&store)?;
    Ok(Json(store.add_suggestion(&user_id, payload).await?))
}

/// Profile form posted from the index page; organizations are comma separated.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub name: String,
    #[serde(default)]
    pub organizations: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
}

impl From<RegisterForm> for ProfileRequest {
    fn from(form: RegisterForm) -> Self {
        Self {
            name: form.name,
            organizations: form.organizations.split(',').map(str::to_string).collect(),
            bio: form.bio,
            city: form.city,
            occupation: form.occupation,
        }
    }
}

/// Visit planner form; browsers post empty strings for unset date inputs.
#[derive(Debug, Deserialize)]
pub struct PlanVisitForm {
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub notes: String,
}

impl TryFrom<PlanVisitForm> for PlanVisitRequest {
    type Error = AppError;

    fn try_from(form: PlanVisitForm) -> Result<Self, Self::Error> {
        Ok(Self {
            start_date: parse_form_date("start_date", &form.start_date)?,
            end_date: parse_form_date("end_date", &form.end_date)?,
            notes: Some(form.notes),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SuggestionForm {
    pub visit_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggested_date: String,
}

impl TryFrom<SuggestionForm> for SuggestionRequest {
    type Error = AppError;

    fn try_from(form: SuggestionForm) -> Result<Self, Self::Error> {
        Ok(Self {
            suggested_date: parse_form_date("suggested_date", &form.suggested_date)?,
            visit_id: form.visit_id,
            title: form.title,
            description: form.description,
        })
    }
}

fn parse_form_date(field: &str, text: &str) -> Result<Option<NaiveDate>, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| AppError::bad_request(format!("{field} must be a YYYY-MM-DD date")))
}

pub async fn register_form(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, AppError> {
    let mut store = state.store.lock().await;
    store.register(form.into()).await?;
    Ok(Redirect::to("/"))
}

pub async fn in_town_form(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let mut store = state.store.lock().await;
    let user_id = current_user_id(&store)?;
    store.mark_in_town(&user_id).await?;
    Ok(Redirect::to("/"))
}

pub async fn plan_visit_form(
    State(state): State<AppState>,
    Form(form): Form<PlanVisitForm>,
) -> Result<Redirect, AppError> {
    let plan = PlanVisitRequest::try_from(form)?;
    let mut store = state.store.lock().await;
    let user_id = current_user_id(&store)?;
    store.plan_visit(&user_id, plan).await?;
    Ok(Redirect::to("/"))
}

pub async fn suggestion_form(
    State(state): State<AppState>,
    Form(form): Form<SuggestionForm>,
) -> Result<Redirect, AppError> {
    let request = SuggestionRequest::try_from(form)?;
    let mut store = state.store.lock().await;
    let user_id = current_user_id(&store)?;
    store.add_suggestion(&user_id, request).await?;
    Ok(Redirect::to("/"))
}

pub async fn leave_form(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let mut store = state.store.lock().await;
    store.leave_directory().await?;
    Ok(Redirect::to("/"))
}

pub async fn logout_form(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let mut store = state.store.lock().await;
    store.clear_session().await?;
    Ok(Redirect::to("/"))
}

fn current_user_id(store: &Store) -> Result<String, AppError> {
    store
        .current_user()
        .map(|user| user.id.clone())
        .ok_or_else(AppError::no_current_user)
}
