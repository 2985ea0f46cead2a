//! Client-side session lifecycle for Dealboard.
//!
//! [`SessionClient`] restores a session at startup, signs users in with
//! email/password or OAuth (PKCE), keeps the access token fresh for
//! authenticated requests, and tears everything down on sign-out or
//! rejection. The web build relies on a backend cookie
//! ([`auth::transport::CookieTransport`]); the native build holds a token
//! pair in secure storage ([`auth::transport::BearerTokenTransport`]).

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod push;
pub mod session;

pub use client::{SessionClient, SessionClientBuilder};
pub use config::{Config, Platform};
pub use error::{AuthError, Result};
pub use session::{Route, SessionEvent, SessionState, SessionStore};
