//! HTTP处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use carequeue_core::utils::generate_patient_id;
use carequeue_core::{Department, PatientStatus, QueueEntry, QueueError};
use carequeue_engine::{
    DepartmentQueueRow, InProgressRow, PatientFilter, PatientStatusView, QueueEngine, QueueStats,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub engine: QueueEngine,
}

impl AppState {
    pub fn new(engine: QueueEngine) -> Self {
        Self { engine }
    }
}

/// HTTP 层错误包装
#[derive(Debug)]
pub struct ApiError(pub QueueError);

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            "not_found" => StatusCode::NOT_FOUND,
            "already_queued" | "illegal_transition" => StatusCode::CONFLICT,
            "invalid_priority" | "unknown_department" | "validation" => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected ({}): {}", status, self.0);
        }

        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// 登记患者请求
#[derive(Debug, Deserialize)]
pub struct RegisterPatientRequest {
    /// 缺省时自动生成
    pub patient_id: Option<String>,
    pub name: String,
}

/// 登记并预约请求
#[derive(Debug, Deserialize)]
pub struct AdmitPatientRequest {
    pub name: String,
    pub department_id: String,
    pub priority: String,
}

/// 预约请求
#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: String,
    pub department_id: String,
    pub priority: String,
}

/// 科室负载更新请求
#[derive(Debug, Deserialize)]
pub struct UpdateLoadRequest {
    pub current_load_percent: u8,
}

/// 患者列表查询参数
#[derive(Debug, Deserialize)]
pub struct PatientQueryParams {
    /// `all` 或具体状态
    pub status: Option<String>,
    pub department: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// 患者列表响应
#[derive(Debug, Serialize)]
pub struct PatientListResponse {
    pub patients: Vec<PatientStatusView>,
    /// 分页前的匹配总数
    pub total: usize,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 科室列表
pub async fn list_departments(State(state): State<AppState>) -> ApiResult<Json<Vec<Department>>> {
    Ok(Json(state.engine.list_departments().await?))
}

/// 科室候诊列表
pub async fn department_queue(
    State(state): State<AppState>,
    Path(department_id): Path<String>,
) -> ApiResult<Json<Vec<DepartmentQueueRow>>> {
    Ok(Json(state.engine.get_department_snapshot(&department_id).await?))
}

/// 科室就诊中列表
pub async fn department_in_progress(
    State(state): State<AppState>,
    Path(department_id): Path<String>,
) -> ApiResult<Json<Vec<InProgressRow>>> {
    Ok(Json(state.engine.in_progress(&department_id).await?))
}

/// 更新科室负载
pub async fn update_department_load(
    State(state): State<AppState>,
    Path(department_id): Path<String>,
    Json(request): Json<UpdateLoadRequest>,
) -> ApiResult<Json<Department>> {
    state
        .engine
        .update_department_load(&department_id, request.current_load_percent)
        .await?;
    Ok(Json(state.engine.get_department(&department_id).await?))
}

/// 登记患者
pub async fn register_patient(
    State(state): State<AppState>,
    Json(request): Json<RegisterPatientRequest>,
) -> ApiResult<(StatusCode, Json<PatientStatusView>)> {
    let patient_id = request.patient_id.unwrap_or_else(generate_patient_id);
    let patient = state.engine.register_patient(&patient_id, &request.name).await?;
    Ok((StatusCode::CREATED, Json(patient.into())))
}

/// 登记并预约
pub async fn admit_patient(
    State(state): State<AppState>,
    Json(request): Json<AdmitPatientRequest>,
) -> ApiResult<(StatusCode, Json<QueueEntry>)> {
    let entry = state
        .engine
        .admit_patient(&request.name, &request.department_id, &request.priority)
        .await?;
    info!("Admitted patient {} to {}", entry.patient_id, entry.department_id);
    Ok((StatusCode::CREATED, Json(entry)))
}

/// 患者列表
pub async fn list_patients(
    State(state): State<AppState>,
    Query(params): Query<PatientQueryParams>,
) -> ApiResult<Json<PatientListResponse>> {
    let status = match params.status.as_deref() {
        None | Some("all") => None,
        Some(value) => Some(value.parse::<PatientStatus>()?),
    };
    let filter = PatientFilter {
        status,
        department_id: params.department,
        limit: params.limit.or(PatientFilter::default().limit),
        offset: params.offset,
    };

    let page = state.engine.list_patients(&filter).await?;

    Ok(Json(PatientListResponse {
        total: page.total,
        patients: page.patients.into_iter().map(PatientStatusView::from).collect(),
        offset: filter.offset.unwrap_or(0),
        limit: filter.limit,
    }))
}

/// 患者状态
pub async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<Json<PatientStatusView>> {
    Ok(Json(state.engine.get_patient_status(&patient_id).await?))
}

/// 护士站推进
pub async fn advance_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<Json<PatientStatusView>> {
    let patient = state.engine.staff_advance_patient(&patient_id).await?;
    Ok(Json(patient.into()))
}

/// 预约
pub async fn book_appointment(
    State(state): State<AppState>,
    Json(request): Json<BookAppointmentRequest>,
) -> ApiResult<(StatusCode, Json<QueueEntry>)> {
    let entry = state
        .engine
        .book_appointment(&request.patient_id, &request.department_id, &request.priority)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// 取消预约
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.cancel_appointment(&patient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 队列统计
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    Ok(Json(state.engine.stats().await?))
}
