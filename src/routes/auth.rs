/// Authentication Routes
///
/// Handles registration, login, token refresh and logout.

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use serde::Deserialize;

use crate::auth::{AuthService, Principal, TokenPair};
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::middleware::ACCESS_TOKEN_COOKIE;
use crate::routes::UserResponse;
use crate::store::Role;

pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub identity: String,
    pub password: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub identity: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn auth_cookie(name: &'static str, value: String, settings: &ApplicationSettings) -> Cookie<'static> {
    let same_site = if settings.secure_cookies {
        SameSite::None
    } else {
        SameSite::Lax
    };

    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(settings.secure_cookies)
        .same_site(same_site)
        .finish()
}

/// Attach both tokens of `pair` as httpOnly cookies
fn with_session_cookies(
    mut response: HttpResponseBuilder,
    pair: &TokenPair,
    refresh_lifetime: chrono::Duration,
    settings: &ApplicationSettings,
) -> HttpResponseBuilder {
    let mut access = auth_cookie(ACCESS_TOKEN_COOKIE, pair.access_token.clone(), settings);
    access.set_max_age(time::Duration::seconds(pair.expires_in));

    let mut refresh = auth_cookie(REFRESH_TOKEN_COOKIE, pair.refresh_token.clone(), settings);
    refresh.set_max_age(time::Duration::seconds(refresh_lifetime.num_seconds()));

    response.cookie(access).cookie(refresh);
    response
}

/// Expire both session cookies on the client
pub(super) fn with_cleared_cookies(
    mut response: HttpResponseBuilder,
    settings: &ApplicationSettings,
) -> HttpResponseBuilder {
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        let mut cookie = auth_cookie(name, String::new(), settings);
        cookie.make_removal();
        response.cookie(cookie);
    }
    response
}

/// POST /auth/register
///
/// Create a user with `Role::User`.
///
/// # Errors
/// - 400: invalid identity or weak password
/// - 409: identity already registered
/// - 503: credential store unavailable
pub async fn register(
    form: web::Json<RegisterRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let record = service
        .register(&form.identity, &form.password, Role::User)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    tracing::info!(
        request_id = %context.request_id,
        identity = %record.identity,
        "Registration completed"
    );

    Ok(HttpResponse::Created().json(UserResponse::from(&record)))
}

/// POST /auth/login
///
/// Returns the token pair as JSON and sets it as cookies.
///
/// # Errors
/// - 401: unknown identity or wrong password (indistinguishable)
/// - 503: credential store unavailable
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
    settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login").with_identity(form.identity.clone());

    let pair = service
        .login(&form.identity, &form.password)
        .await
        .map_err(|e| {
            let e = AppError::from(e);
            context.log_error(&e);
            e
        })?;

    tracing::info!(request_id = %context.request_id, "Login completed");

    Ok(with_session_cookies(
        HttpResponse::Ok(),
        &pair,
        service.refresh_token_lifetime(),
        &settings,
    )
    .json(pair))
}

/// POST /auth/refresh
///
/// Rotates the refresh token taken from the JSON body or, failing that, the
/// `refreshToken` cookie. The presented token is dead afterwards.
///
/// # Errors
/// - 401: missing, invalid, expired or superseded refresh token
/// - 503: credential store unavailable
pub async fn refresh(
    req: HttpRequest,
    form: Option<web::Json<RefreshRequest>>,
    service: web::Data<AuthService>,
    settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let presented = form
        .map(|form| form.into_inner().refresh_token)
        .or_else(|| req.cookie(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_owned()))
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthorized)?;

    let pair = service.refresh(&presented).await?;

    tracing::info!(request_id = %context.request_id, "Token refresh completed");

    Ok(with_session_cookies(
        HttpResponse::Ok(),
        &pair,
        service.refresh_token_lifetime(),
        &settings,
    )
    .json(pair))
}

/// POST /auth/logout
///
/// **Requires a valid access token.** Forgets the stored refresh token and
/// clears both cookies. Access tokens already issued stay valid until they
/// expire.
pub async fn logout(
    principal: web::ReqData<Principal>,
    service: web::Data<AuthService>,
    settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    service.logout(&principal.identity).await?;

    Ok(with_cleared_cookies(HttpResponse::NoContent(), &settings).finish())
}
