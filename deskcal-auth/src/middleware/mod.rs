pub mod auth;

pub use auth::{auth_middleware, bearer_token, AuthUser, ADMIN_COOKIE, SESSION_COOKIE};
