/// Access Gate Middleware
///
/// Validates the access token of every request in its scope and injects the
/// resulting `Principal` into request extensions for route handlers and the
/// role guard. The token is read from the `Authorization: Bearer` header, or
/// from the `accessToken` cookie when no header is present.
///
/// The gate fails closed: anything other than a verified, unexpired access
/// token is `AuthError::Unauthenticated`. It never touches the credential
/// store, so access tokens stay valid until they expire even after the
/// refresh token they were issued with has been rotated.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{AccessTokenCodec, Principal};
use crate::error::{AppError, AuthError};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Gate for protected scopes
#[derive(Clone)]
pub struct AccessGate {
    tokens: Arc<AccessTokenCodec>,
}

impl AccessGate {
    pub fn new(tokens: Arc<AccessTokenCodec>) -> Self {
        Self { tokens }
    }

    /// Resolve the caller behind `token`
    pub fn admit(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        let token = token.ok_or_else(|| {
            tracing::debug!("Request without access token");
            AuthError::Unauthenticated
        })?;

        self.tokens
            .verify(token)
            .map(|signed| Principal::from(signed.claims))
            .map_err(|e| {
                tracing::warn!(reason = %e, "Access token rejected");
                AuthError::Unauthenticated
            })
    }
}

/// Pull the access token from the header, falling back to the cookie
pub fn access_token_from(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned);

    from_header.or_else(|| {
        req.cookie(ACCESS_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_owned())
            .filter(|token| !token.is_empty())
    })
}

impl<S, B> Transform<S, ServiceRequest> for AccessGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessGateService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AccessGateService {
            service: Rc::new(service),
            gate: self.clone(),
        }))
    }
}

pub struct AccessGateService<S> {
    service: Rc<S>,
    gate: AccessGate,
}

impl<S, B> Service<ServiceRequest> for AccessGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = access_token_from(req.request());

        match self.gate.admit(token.as_deref()) {
            Ok(principal) => {
                tracing::debug!(
                    identity = %principal.identity,
                    role = %principal.role,
                    "Access token accepted"
                );
                req.extensions_mut().insert(principal);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => Box::pin(async move { Err(AppError::from(e).into()) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test as actix_test;
    use actix_web::{http::StatusCode, web, App, HttpResponse};
    use chrono::Duration;

    use crate::auth::{AccessClaims, TokenCodec};
    use crate::store::Role;

    fn codec() -> Arc<AccessTokenCodec> {
        Arc::new(TokenCodec::new(
            "test-access-secret-at-least-32-characters",
            Duration::minutes(15),
            "test",
        ))
    }

    fn token_for(codec: &AccessTokenCodec, identity: &str, role: Role) -> String {
        codec
            .issue(AccessClaims {
                sub: identity.to_string(),
                role,
            })
            .unwrap()
    }

    async fn whoami(principal: web::ReqData<Principal>) -> HttpResponse {
        HttpResponse::Ok().body(format!("{}:{}", principal.identity, principal.role))
    }

    #[test]
    fn test_admit_without_token() {
        let gate = AccessGate::new(codec());
        assert_eq!(gate.admit(None), Err(AuthError::Unauthenticated));
    }

    #[test]
    fn test_admit_valid_token() {
        let codec = codec();
        let gate = AccessGate::new(codec.clone());
        let token = token_for(&codec, "u1", Role::User);

        let principal = gate.admit(Some(&token)).unwrap();
        assert_eq!(principal.identity, "u1");
        assert_eq!(principal.role, Role::User);
    }

    #[test]
    fn test_admit_expired_token() {
        let codec = codec();
        let gate = AccessGate::new(codec.clone());
        let expired = codec
            .issue_for(
                AccessClaims {
                    sub: "u1".to_string(),
                    role: Role::User,
                },
                Duration::seconds(-5),
            )
            .unwrap();

        assert_eq!(gate.admit(Some(&expired)), Err(AuthError::Unauthenticated));
    }

    #[test]
    fn test_header_takes_precedence_over_cookie() {
        let req = actix_test::TestRequest::default()
            .insert_header(("Authorization", "Bearer from-header"))
            .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "from-cookie"))
            .to_http_request();
        assert_eq!(access_token_from(&req).as_deref(), Some("from-header"));

        let req = actix_test::TestRequest::default()
            .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "from-cookie"))
            .to_http_request();
        assert_eq!(access_token_from(&req).as_deref(), Some("from-cookie"));

        let req = actix_test::TestRequest::default()
            .insert_header(("Authorization", "Basic dTE6cGFzcw=="))
            .to_http_request();
        assert_eq!(access_token_from(&req), None);
    }

    #[actix_web::test]
    async fn test_middleware_attaches_principal() {
        let codec = codec();
        let app = actix_test::init_service(
            App::new()
                .wrap(AccessGate::new(codec.clone()))
                .route("/", web::get().to(whoami)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/")
            .insert_header(("Authorization", format!("Bearer {}", token_for(&codec, "u1", Role::Admin))))
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;

        assert_eq!(body, "u1:Admin");
    }

    #[actix_web::test]
    async fn test_middleware_fails_closed() {
        let app = actix_test::init_service(
            App::new()
                .wrap(AccessGate::new(codec()))
                .route("/", web::get().to(whoami)),
        )
        .await;

        for header in [None, Some("Bearer garbage")] {
            let mut req = actix_test::TestRequest::get().uri("/");
            if let Some(value) = header {
                req = req.insert_header(("Authorization", value));
            }

            let status = match app.call(req.to_request()).await {
                Ok(res) => res.status(),
                Err(err) => err.error_response().status(),
            };
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }
}
