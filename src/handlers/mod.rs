// handlers/mod.rs - HTTP handlers in two security tiers
//
// Public (no auth) serves token acquisition, the OAuth callback and media.
// Protected (JWT auth) serves everything under /api.

pub mod extract;
pub mod protected;
pub mod public;
