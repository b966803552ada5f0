use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::userdb::UserExt,
    error::{ErrorMessage, HttpError},
    models::usermodel::{User, UserRole},
    utils::token,
    AppState,
};

pub const AUTH_COOKIE: &str = "token";

/// The authenticated caller, inserted into request extensions by [`auth`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JWTAuthMiddeware {
    pub user: User,
}

/// The cookie wins over the header when both are sent.
fn bearer_token(cookie_jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = cookie_jar.get(AUTH_COOKIE) {
        return Some(cookie.value().to_owned());
    }

    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

async fn load_caller(app_state: &AppState, token: String) -> Result<User, HttpError> {
    let invalid = || HttpError::unauthorized(ErrorMessage::InvalidToken.to_string());
    let gone = || HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string());

    let subject =
        token::decode_token(token, app_state.env.jwt_secret.as_bytes()).map_err(|_| invalid())?;
    let user_id = Uuid::parse_str(&subject).map_err(|_| invalid())?;

    match app_state.db_client.get_user(Some(user_id), None, None).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(gone()),
        Err(err) => {
            tracing::error!("Failed to load user {} for request: {}", user_id, err);
            Err(gone())
        }
    }
}

pub async fn auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let Some(token) = bearer_token(&cookie_jar, req.headers()) else {
        return Err(HttpError::unauthorized(
            ErrorMessage::TokenNotProvided.to_string(),
        ));
    };

    let user = load_caller(&app_state, token).await?;
    req.extensions_mut().insert(JWTAuthMiddeware { user });

    Ok(next.run(req).await)
}

/// Must be layered inside [`auth`].
pub async fn role_check(
    Extension(_app_state): Extension<Arc<AppState>>,
    req: Request,
    next: Next,
    allowed: Vec<UserRole>,
) -> Result<impl IntoResponse, HttpError> {
    let role = match req.extensions().get::<JWTAuthMiddeware>() {
        Some(caller) => caller.user.role,
        None => {
            return Err(HttpError::unauthorized(
                ErrorMessage::UserNotAuthenticated.to_string(),
            ))
        }
    };

    if !allowed.contains(&role) {
        tracing::debug!("Rejected {} for role {}", req.uri().path(), role.to_str());
        return Err(HttpError::new(
            ErrorMessage::PermissionDenied.to_string(),
            StatusCode::FORBIDDEN,
        ));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn reads_bearer_header() {
        let token = bearer_token(&CookieJar::new(), &headers_with("Bearer abc.def"));
        assert_eq!(token.as_deref(), Some("abc.def"));
    }

    #[test]
    fn ignores_other_schemes_and_empty_tokens() {
        assert!(bearer_token(&CookieJar::new(), &headers_with("Basic abc")).is_none());
        assert!(bearer_token(&CookieJar::new(), &headers_with("Bearer   ")).is_none());
        assert!(bearer_token(&CookieJar::new(), &HeaderMap::new()).is_none());
    }

    #[test]
    fn cookie_takes_precedence() {
        let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE, "from-cookie"));
        let token = bearer_token(&jar, &headers_with("Bearer from-header"));
        assert_eq!(token.as_deref(), Some("from-cookie"));
    }
}
