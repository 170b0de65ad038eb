use axum::extract::{Path, State};
use axum::Json;

use crate::error::AppError;
use crate::rooms::code::is_valid_code;
use crate::rooms::RoomStatus;
use crate::state::AppState;

pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomStatus>, AppError> {
    if !is_valid_code(&code) {
        return Err(AppError::BadRequest("room code must be 4 digits".to_string()));
    }
    let status = state
        .registry
        .room_status(&code)
        .ok_or_else(|| AppError::NotFound("room not found".to_string()))?;
    Ok(Json(status))
}
