use axum::{http::StatusCode, response::{IntoResponse, Response}};
use tracing::error;

use crate::{auth::AuthError, hub::{HubError, SubscriptionError}};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Auth(AuthError::Signing(e)) => {
                error!(error = %e, "failed to sign token");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            AppError::Auth(e) => (StatusCode::UNAUTHORIZED, e.to_string()).into_response(),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Internal(e) => {
                error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("{}\n\n{}", e, e.backtrace()),
                )
                    .into_response()
            }
        }
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self::BadRequest(err.to_owned())
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(sqlx::Error);
apperr_impl!(HubError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let status = |e: AppError| e.into_response().status();
        assert_eq!(status(AuthError::MissingToken.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::InvalidPassword.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status("User is required".into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(SubscriptionError::NoDestination.into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(HubError::Stopped.into()), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
