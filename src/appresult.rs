use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::debug;

use crate::hub::HubError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Hub(HubError::RoomNotFound(_) | HubError::RoomClosed(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Hub(HubError::ParticipantNotFound) | AppError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Hub(HubError::NotAMember) => StatusCode::FORBIDDEN,
            AppError::Hub(HubError::AgentBusy) => StatusCode::CONFLICT,
            AppError::Hub(
                HubError::InvalidState(_)
                | HubError::AlreadyOccupied(_)
                | HubError::MissingCustomer(_),
            )
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        debug!(%status, error = %self, "request rejected");
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_errors_map_to_statuses() {
        let status = |e: HubError| AppError::from(e).status_code();
        assert_eq!(status(HubError::RoomNotFound("r".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(HubError::ParticipantNotFound), StatusCode::UNAUTHORIZED);
        assert_eq!(status(HubError::NotAMember), StatusCode::FORBIDDEN);
        assert_eq!(status(HubError::AgentBusy), StatusCode::CONFLICT);
        assert_eq!(status(HubError::AlreadyOccupied("r".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::BadRequest("name and content are required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
