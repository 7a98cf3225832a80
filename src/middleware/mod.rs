/// Middleware module
///
/// Request gating: access-token verification and role checks.

mod access_gate;
mod role_guard;

pub use access_gate::{access_token_from, AccessGate, ACCESS_TOKEN_COOKIE};
pub use role_guard::{authorize, AdminOnly, AnyUser, RequireRole, RoleRequirement};
