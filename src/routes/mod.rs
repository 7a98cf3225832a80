mod auth;
mod health_check;
mod users;

pub use auth::{login, logout, refresh, register, REFRESH_TOKEN_COOKIE};
pub use health_check::health_check;
pub use users::{
    delete_current_user, delete_user, get_current_user, get_user, list_users,
    update_current_user, update_user, UserResponse,
};
