pub mod fetch;
pub mod forms;
pub mod jwt;
pub mod oauth;
pub mod pkce;
pub mod refresh;
pub mod restore;
pub mod store;
pub mod transport;
pub mod user;

pub use fetch::{AuthFetch, FetchOptions};
pub use forms::{ActionError, FieldErrors};
pub use oauth::{AuthorizationRequest, AuthorizationResponse, ExchangeOutcome, OAuthFlow};
pub use store::{REFRESH_TOKEN_KEY, TOKEN_KEY, TokenStorage, TokenStore};
pub use transport::{RestoreOutcome, SessionTransport};
pub use user::AuthenticatedUser;
