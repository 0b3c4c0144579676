// handlers/public/mod.rs - Public handlers (no authentication required)
//
// The OAuth callback is public because the browser arrives from the
// provider without our bearer token; the single-use state carries the user.

pub mod auth;
pub mod media;
pub mod oauth;
pub mod root;
