/// Role Guard Middleware
///
/// Consumes the `Principal` attached by `AccessGate` and rejects callers whose
/// role does not meet the scope's requirement. Must be wrapped inside the gate
/// (registered before it with `.wrap`) so the principal is already present.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::Principal;
use crate::error::{AppError, AuthError};
use crate::store::Role;

/// A rule over the caller's role
pub trait RoleRequirement: Clone + 'static {
    fn permits(&self, role: Role) -> bool;
}

/// Any authenticated user
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyUser;

/// Only `Role::Admin`
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminOnly;

impl RoleRequirement for AnyUser {
    fn permits(&self, _role: Role) -> bool {
        true
    }
}

impl RoleRequirement for AdminOnly {
    fn permits(&self, role: Role) -> bool {
        role == Role::Admin
    }
}

/// Check `principal` against `requirement`
pub fn authorize<R: RoleRequirement>(
    requirement: &R,
    principal: Option<&Principal>,
) -> Result<(), AuthError> {
    let principal = principal.ok_or(AuthError::Unauthenticated)?;

    if requirement.permits(principal.role) {
        Ok(())
    } else {
        tracing::warn!(
            identity = %principal.identity,
            role = %principal.role,
            "Insufficient role for route"
        );
        Err(AuthError::Forbidden)
    }
}

pub struct RequireRole<R> {
    requirement: R,
}

impl<R: RoleRequirement> RequireRole<R> {
    pub fn new(requirement: R) -> Self {
        Self { requirement }
    }
}

impl<S, B, R> Transform<S, ServiceRequest> for RequireRole<R>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    R: RoleRequirement,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleService<S, R>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequireRoleService {
            service: Rc::new(service),
            requirement: self.requirement.clone(),
        }))
    }
}

pub struct RequireRoleService<S, R> {
    service: Rc<S>,
    requirement: R,
}

impl<S, B, R> Service<ServiceRequest> for RequireRoleService<S, R>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    R: RoleRequirement,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let outcome = authorize(&self.requirement, req.extensions().get::<Principal>());

        match outcome {
            Ok(()) => {
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

    fn principal(role: Role) -> Principal {
        Principal {
            identity: "u1".to_string(),
            role,
        }
    }

    #[test]
    fn test_any_user_accepts_every_role() {
        assert!(authorize(&AnyUser, Some(&principal(Role::User))).is_ok());
        assert!(authorize(&AnyUser, Some(&principal(Role::Admin))).is_ok());
    }

    #[test]
    fn test_admin_only() {
        assert!(authorize(&AdminOnly, Some(&principal(Role::Admin))).is_ok());
        assert_eq!(
            authorize(&AdminOnly, Some(&principal(Role::User))),
            Err(AuthError::Forbidden)
        );
    }

    #[test]
    fn test_missing_principal_is_unauthenticated() {
        assert_eq!(authorize(&AnyUser, None), Err(AuthError::Unauthenticated));
        assert_eq!(authorize(&AdminOnly, None), Err(AuthError::Unauthenticated));
    }
}
