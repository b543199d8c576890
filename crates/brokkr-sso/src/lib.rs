//! Enterprise SSO broker core.
//!
//! Presents one OAuth2-shaped authorization-code flow to service
//! providers and delegates the actual authentication to whichever SAML2
//! or OIDC identity provider is configured for the requesting tenant and
//! product. Connections, login sessions, single-use codes and access
//! tokens live in the encrypted storage layer provided by `brokkr-store`.
//!
//! # Endpoints
//!
//! ## Protocol endpoints (mounted at the root)
//!
//! - `GET /authorize` - OAuth2 authorization endpoint
//! - `POST /saml/acs` - SAML assertion consumer service
//! - `GET /oidc/callback` - upstream OIDC redirect endpoint
//! - `POST /token` - authorization-code exchange
//! - `GET|POST /userinfo` - profile lookup by bearer token
//!
//! ## Admin endpoints (nest under /api/v1, API-key guarded)
//!
//! - `GET|POST /connections` - list or create connections
//! - `GET|PATCH|DELETE /connections/:client_id` - manage one connection
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::Router;
//! use brokkr_sso::{admin_router, sso_router, SsoOptions, SsoState};
//! use brokkr_store::Database;
//!
//! let state = SsoState::new(Database::in_memory(), SsoOptions::default());
//! let app = Router::new()
//!     .merge(sso_router(state.clone()))
//!     .nest("/api/v1", admin_router(state));
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod oidc;
pub mod pkce;
pub mod router;
pub mod saml;
pub mod services;

pub use error::{SsoError, SsoErrorCode, SsoErrorResponse, SsoResult};
pub use router::{admin_router, sso_router, SsoOptions, SsoState};
pub use saml::{SamlSignatureValidator, UnconfiguredValidator};
