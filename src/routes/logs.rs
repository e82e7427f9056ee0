use crate::audit::{DailyBucket, HourlyBucket, Statistics, TopActive};
use crate::auth::AuthPrincipal;
use crate::domain::{Direction, Role, ScanId, ScanLog, ScanResult};
use crate::error::GateError;
use crate::state::AppState;
use crate::store::ScanFilter;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

fn require_staff(auth: &AuthPrincipal) -> Result<(), GateError> {
    auth.require_role(&[Role::Admin, Role::Guard])
}

#[derive(Serialize)]
pub struct ScanLogOut {
    pub id: ScanId,
    pub pass_id: Option<u64>,
    pub subject_id: Option<u64>,
    pub scanner_id: u64,
    pub direction: Direction,
    pub result: ScanResult,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    pub emergency: bool,
}

impl From<ScanLog> for ScanLogOut {
    fn from(s: ScanLog) -> Self {
        Self {
            id: s.id,
            pass_id: s.pass_id,
            subject_id: s.subject_id,
            scanner_id: s.scanner_id,
            direction: s.direction,
            result: s.result,
            detail: s.detail,
            timestamp: s.timestamp,
            emergency: s.emergency,
        }
    }
}

#[derive(Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn recent(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(q): Query<RecentQuery>,
) -> Result<Json<Vec<ScanLogOut>>, GateError> {
    require_staff(&auth)?;
    let out = state.analytics.recent(q.limit, q.offset);
    Ok(Json(out.into_iter().map(ScanLogOut::from).collect()))
}

#[derive(Deserialize)]
pub struct DaysQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    7
}

pub async fn statistics(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(q): Query<DaysQuery>,
) -> Result<Json<Statistics>, GateError> {
    require_staff(&auth)?;
    Ok(Json(state.analytics.statistics(q.days)))
}

#[derive(Deserialize)]
pub struct HourlyQuery {
    pub date: Option<NaiveDate>,
}

pub async fn hourly(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(q): Query<HourlyQuery>,
) -> Result<Json<Vec<HourlyBucket>>, GateError> {
    require_staff(&auth)?;
    let day = q
        .date
        .unwrap_or_else(|| Utc::now().with_timezone(&state.config.analytics_offset).date_naive());
    Ok(Json(state.analytics.hourly(day)))
}

pub async fn daily(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(q): Query<DaysQuery>,
) -> Result<Json<Vec<DailyBucket>>, GateError> {
    require_staff(&auth)?;
    Ok(Json(state.analytics.daily(q.days)))
}

#[derive(Deserialize)]
pub struct TopActiveQuery {
    #[serde(default = "default_days")]
    pub days: i64,
    #[serde(default = "default_top_limit")]
    pub limit: usize,
}

fn default_top_limit() -> usize {
    10
}

pub async fn top_students(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(q): Query<TopActiveQuery>,
) -> Result<Json<Vec<TopActive>>, GateError> {
    require_staff(&auth)?;
    Ok(Json(state.analytics.top_active(q.days, q.limit)))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub subject_code: Option<String>,
    pub direction: Option<String>,
    pub result: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<ScanLogOut>>, GateError> {
    require_staff(&auth)?;
    let direction = match q.direction.as_deref() {
        Some(d) => Some(Direction::parse(d).ok_or(GateError::BadRequest("unknown direction".to_string()))?),
        None => None,
    };
    let result = match q.result.as_deref() {
        Some("success") => Some(ScanResult::Success),
        Some("expired") => Some(ScanResult::Expired),
        Some("invalid") => Some(ScanResult::Invalid),
        Some("replay") => Some(ScanResult::Replay),
        Some("not-approved") => Some(ScanResult::NotApproved),
        Some("denied") => Some(ScanResult::Denied),
        Some(_) => return Err(GateError::BadRequest("unknown result filter".to_string())),
        None => None,
    };
    let filter = ScanFilter {
        subject_code_contains: q.subject_code,
        date_from: q.date_from,
        date_to: q.date_to,
        direction,
        result,
    };
    let out = state.analytics.search(&filter, q.limit);
    Ok(Json(out.into_iter().map(ScanLogOut::from).collect()))
}
