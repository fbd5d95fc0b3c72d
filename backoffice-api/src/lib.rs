//! Backoffice API - Abstract exchange with the console REST API
//!
//! Defines the request/response vocabulary the session core is written
//! against, plus the reqwest-backed transport used in production. Tests and
//! hosts can substitute any [`ApiTransport`] implementation.

pub mod endpoints;
pub mod transport;

pub use endpoints::{
    is_auth_endpoint, AuthPayload, MePayload, PermissionsEnvelope, PermissionsPayload,
    RefreshRequest, LOGIN_PATH, LOGOUT_PATH, ME_PATH, PERMISSIONS_PATH, REFRESH_PATH,
};
pub use transport::{ApiRequest, ApiResponse, ApiTransport, HttpTransport, Method, TransportConfig};
