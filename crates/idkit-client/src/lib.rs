//! Clients for identity server integration tests.
//!
//! Authenticated REST clients for the claim, application and SCIM2 APIs,
//! and a browser-less driver for the OIDC authorization flow.

pub mod applications;
pub mod claims;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod http;
pub mod oidc;
pub mod scim;

pub use applications::{
    ApplicationManagementClient, ApplicationModel, ClaimConfiguration, ClaimDialect,
    InboundProtocols, OpenIdConnectConfiguration,
};
pub use claims::{dialect_id, ClaimManagementClient, ExternalClaimReq, LOCAL_DIALECT_ID};
pub use config::{FlowConfig, LoggingConfig, ServerConfig, TenantConfig, TestkitConfig};
pub use context::{
    OidcApplication, OidcTestContext, ProvisionedUser, RegisteredApplication, DEFAULT_ROLE,
    OIDC_GRANT_TYPES,
};
pub use credentials::{basic_auth_header, TenantCredentials};
pub use error::{ClientError, ConfigError};
pub use http::{build_http_client, RestClient, RestResponse};
pub use oidc::{AuthorizationFlow, FlowEndpoints, FlowOutcome, FlowStep, RedirectTarget, SessionDataKey};
pub use scim::{PatchOperationRequest, Scim2Client, UserObject};
