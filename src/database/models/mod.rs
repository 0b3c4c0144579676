pub mod account;
pub mod media;
pub mod oauth_state;
pub mod post;
pub mod user;

pub use account::{AccountView, ConnectedAccount, TokenUpdate};
pub use media::MediaObject;
pub use oauth_state::OAuthState;
pub use post::Post;
pub use user::{User, UserView};
