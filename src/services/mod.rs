// services/mod.rs - Business logic between the HTTP handlers and the store
//
// Each service is a short-lived struct over a clone of `AppState`.

pub mod account_service;
pub mod auth_service;
pub mod connect_service;
pub mod error;
pub mod media_service;
pub mod post_service;
pub mod publish_service;
pub mod scheduler;
pub mod token_service;

pub use account_service::AccountService;
pub use auth_service::AuthService;
pub use connect_service::ConnectService;
pub use error::ServiceError;
pub use media_service::{LocalMediaStore, MediaService, MediaStore};
pub use post_service::PostService;
pub use publish_service::PublishService;
pub use scheduler::{Scheduler, TickReport};
pub use token_service::TokenService;
