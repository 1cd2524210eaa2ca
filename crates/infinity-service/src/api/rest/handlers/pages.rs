//! Page dispatcher

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::payload::PagePayload;
use axum::extract::{Query, State};
use axum::{Form, Json};
use infinity_core::{ExperimentStep, PageView};
use serde::Serialize;
use tracing::debug;

/// Page to render plus the fields the next request must carry
#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub view: PageView,
    pub next: Option<PagePayload>,
}

impl From<ExperimentStep> for PageResponse {
    fn from(step: ExperimentStep) -> Self {
        Self {
            view: step.view,
            next: step.next.as_ref().map(PagePayload::from_state),
        }
    }
}

/// `GET /` with the payload in the query string
pub async fn page_query(
    State(state): State<AppState>,
    Query(payload): Query<PagePayload>,
) -> ApiResult<Json<PageResponse>> {
    dispatch(state, payload).await.map(Json)
}

/// `POST /` with an urlencoded form
pub async fn page_form(
    State(state): State<AppState>,
    Form(payload): Form<PagePayload>,
) -> ApiResult<Json<PageResponse>> {
    dispatch(state, payload).await.map(Json)
}

async fn dispatch(state: AppState, payload: PagePayload) -> ApiResult<PageResponse> {
    let page = payload.page.clone().unwrap_or_default();
    debug!(page = %page, "page request");

    match page.as_str() {
        "" | "parameters" => Ok(PageResponse {
            view: state.flow.parameters(),
            next: None,
        }),
        "validation" => {
            let flow = state.flow.clone();
            let chain = payload.chain.unwrap_or_default();
            let generation = payload.generation.unwrap_or_default();
            let condition = payload.condition.unwrap_or_default();
            let step = tokio::task::spawn_blocking(move || {
                flow.validate(&chain, &generation, &condition)
            })
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok(step.into())
        }
        "experiment" => {
            let request = payload.into_request()?;
            let flow = state.flow.clone();
            let step = tokio::task::spawn_blocking(move || {
                flow.step(&request, &mut rand::thread_rng())
            })
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;
            Ok(step.into())
        }
        _ => Err(ApiError::UnknownPage(page)),
    }
}
