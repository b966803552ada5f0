use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use axum_extra::extract::cookie::Cookie;
use validator::Validate;

use crate::{
    db::userdb::UserExt,
    dtos::{
        userdtos::{LoginResponseDto, LoginUserDto, RegisterUserDto, UserProfileDto},
        ApiResponse, Response,
    },
    error::{ErrorMessage, HttpError},
    middleware::AUTH_COOKIE,
    models::usermodel::UserRole,
    service::error::is_unique_violation,
    utils::{password, token},
    AppState,
};

pub fn auth_handler() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

pub async fn register(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let existing_email = app_state
        .db_client
        .get_user(None, None, Some(&body.email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;
    if existing_email.is_some() {
        return Err(HttpError::conflict(ErrorMessage::EmailExist.to_string()));
    }

    let existing_username = app_state
        .db_client
        .get_user(None, Some(&body.username), None)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;
    if existing_username.is_some() {
        return Err(HttpError::conflict(ErrorMessage::UsernameExist.to_string()));
    }

    let hashed_password =
        password::hash(&body.password).map_err(|e| HttpError::server_error(e.to_string()))?;

    let role = body.role.unwrap_or(UserRole::Client);

    let user = app_state
        .db_client
        .save_user(body.name, body.username, body.email, hashed_password, role)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                HttpError::conflict(ErrorMessage::EmailExist.to_string())
            } else {
                HttpError::server_error(e.to_string())
            }
        })?;

    tracing::info!("Registered {} {} ({})", role.to_str(), user.username, user.id);

    Ok(Json(ApiResponse::success(
        "Account created",
        UserProfileDto::from(&user),
    )))
}

pub async fn login(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<LoginUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .db_client
        .get_user(None, None, Some(&body.email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let user = result.ok_or(HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()))?;

    let password_matched = password::compare(&body.password, &user.password)
        .map_err(|_| HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()))?;

    if !password_matched {
        return Err(HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()));
    }

    let token = token::create_token(
        &user.id.to_string(),
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
    )
    .map_err(|e| HttpError::server_error(e.to_string()))?;

    let cookie = Cookie::build((AUTH_COOKIE, token.clone()))
        .path("/")
        .max_age(time::Duration::minutes(app_state.env.jwt_maxage))
        .http_only(true)
        .build();

    let mut response = Json(ApiResponse::success(
        "Logged in",
        LoginResponseDto {
            token,
            user: UserProfileDto::from(&user),
        },
    ))
    .into_response();

    response
        .headers_mut()
        .extend(cookie_headers(&cookie.to_string())?);

    Ok(response)
}

pub async fn logout() -> Result<impl IntoResponse, HttpError> {
    let cookie = Cookie::build((AUTH_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::minutes(-1))
        .http_only(true)
        .build();

    let mut response = Json(Response {
        status: "success",
        message: "Logged out".to_string(),
    })
    .into_response();

    response
        .headers_mut()
        .extend(cookie_headers(&cookie.to_string())?);

    Ok(response)
}

fn cookie_headers(cookie: &str) -> Result<HeaderMap, HttpError> {
    let value = HeaderValue::from_str(cookie).map_err(|e| HttpError::server_error(e.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, value);
    Ok(headers)
}
