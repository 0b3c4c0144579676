// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every route here sits behind `jwt_auth_middleware`, which inserts the
// `AuthUser` extension. Services scope every lookup to that user.

pub mod accounts;
pub mod auth;
pub mod connect;
pub mod media;
pub mod posts;
