use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::{
    client_ip::ClientIp,
    http_err::{ApiError, ApiResponse, ErrorRep, InternalServerError},
    server::AppState,
};

use super::services::{
    AccountService, EmailRequestError, RegisterError, ResetPasswordError, TokenRedemptionError,
};

pub mod reps;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register/", post(register))
        .route("/activate/", get(activate))
        .route("/resend_activation/", post(resend_activation))
        .route("/forgot_password/", post(forgot_password))
        .route("/reset_password/", post(reset_password))
}

pub enum RegisterResponse {
    Created(reps::UserResponse),
    BadRequest(reps::NewUserValidationError),
    Duplicate(ErrorRep),
}

impl IntoResponse for RegisterResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(user) => (StatusCode::CREATED, Json(user)).into_response(),
            Self::BadRequest(error) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
            Self::Duplicate(error) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
        }
    }
}

async fn register(
    State(accounts): State<AccountService>,
    ClientIp(client_ip): ClientIp,
    Json(new_user): Json<reps::NewUserRequest>,
) -> ApiResponse<RegisterResponse> {
    match accounts
        .register(&client_ip.to_string(), new_user.into())
        .await
    {
        Ok(user) => Ok(RegisterResponse::Created(user.into())),
        Err(RegisterError::RateLimited(error)) => Err(error.into()),
        Err(RegisterError::InvalidUser(context)) => Ok(RegisterResponse::BadRequest(context.into())),
        Err(RegisterError::DuplicateEmail(_)) => Ok(RegisterResponse::Duplicate(ErrorRep::new(
            "An account with this email already exists.",
        ))),
        // Already logged by the verification service.
        Err(RegisterError::Notification(_)) => Err(InternalServerError::default().into()),
        Err(RegisterError::Other(error)) => Err(error.into()),
    }
}

pub enum TokenResponse<T> {
    Ok(T),
    BadRequest(ErrorRep),
}

impl<T: IntoResponse> IntoResponse for TokenResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(inner) => inner.into_response(),
            Self::BadRequest(error) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
        }
    }
}

fn redemption_error<T>(error: TokenRedemptionError, message: &str) -> ApiResponse<TokenResponse<T>> {
    match error {
        TokenRedemptionError::Other(error) => Err(error.into()),
        _ => Ok(TokenResponse::BadRequest(ErrorRep::new(message))),
    }
}

async fn activate(
    State(accounts): State<AccountService>,
    Query(query): Query<reps::ActivationQuery>,
) -> ApiResponse<TokenResponse<Json<reps::UserResponse>>> {
    match accounts.activate(&query.uid, &query.token).await {
        Ok(user) => Ok(TokenResponse::Ok(Json(user.into()))),
        Err(error) => redemption_error(error, "Invalid or expired activation link."),
    }
}

fn email_request_error(error: EmailRequestError) -> ApiError {
    match error {
        EmailRequestError::RateLimited(error) => error.into(),
        // Already logged by the verification service.
        EmailRequestError::Notification(_) => InternalServerError::default().into(),
        EmailRequestError::Other(error) => error.into(),
    }
}

async fn resend_activation(
    State(accounts): State<AccountService>,
    ClientIp(client_ip): ClientIp,
    Json(request): Json<reps::EmailRequest>,
) -> ApiResponse<Json<reps::EmailRequest>> {
    accounts
        .request_activation(&client_ip.to_string(), &request.email)
        .await
        .map_err(email_request_error)?;

    Ok(Json(request))
}

async fn forgot_password(
    State(accounts): State<AccountService>,
    ClientIp(client_ip): ClientIp,
    Json(request): Json<reps::EmailRequest>,
) -> ApiResponse<Json<reps::EmailRequest>> {
    accounts
        .request_password_reset(&client_ip.to_string(), &request.email)
        .await
        .map_err(email_request_error)?;

    Ok(Json(request))
}

pub enum ResetPasswordResponse {
    NoContent,
    InvalidPassword(reps::PasswordValidationError),
    InvalidToken(ErrorRep),
}

impl IntoResponse for ResetPasswordResponse {
    fn into_response(self) -> Response {
        match self {
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
            Self::InvalidPassword(error) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
            Self::InvalidToken(error) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
        }
    }
}

async fn reset_password(
    State(accounts): State<AccountService>,
    Query(query): Query<reps::ResetPasswordQuery>,
    Json(request): Json<reps::ResetPasswordRequest>,
) -> ApiResponse<ResetPasswordResponse> {
    match accounts.reset_password(&query.token, &request.password).await {
        Ok(()) => Ok(ResetPasswordResponse::NoContent),
        Err(ResetPasswordError::InvalidPassword(context)) => {
            Ok(ResetPasswordResponse::InvalidPassword(context.into()))
        }
        Err(ResetPasswordError::Token(TokenRedemptionError::Other(error))) => Err(error.into()),
        Err(ResetPasswordError::Token(_)) => Ok(ResetPasswordResponse::InvalidToken(
            ErrorRep::new("Invalid or expired password reset link."),
        )),
    }
}
