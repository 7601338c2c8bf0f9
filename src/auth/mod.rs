//! OAuth2 PKCE authentication against pixiv's token endpoint.
//!
//! - [`run_interactive`] runs the interactive authorization-code flow (CLI only)
//! - [`TokenEndpoint`] performs the code and refresh-token grants
//!
//! The client credentials are the provider's fixed mobile-app constants;
//! they are not configurable.

mod login;
mod pkce;
mod token_exchange;

pub use login::{run_interactive, PendingLogin, LOGIN_URL};
pub use pkce::CHALLENGE_METHOD;
pub use token_exchange::{AuthError, TokenEndpoint, AUTH_TOKEN_URL, USER_AGENT};
