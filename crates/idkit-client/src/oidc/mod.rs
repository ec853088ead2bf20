//! OIDC authorization flow driver.

mod flow;
mod redirect;
mod session;

pub use flow::{
    AuthorizationFlow, FlowEndpoints, FlowOutcome, FlowStep, AUTHORIZE_PARAM, GRANT_TYPE_CODE,
};
pub use redirect::RedirectTarget;
pub use session::{
    extract_session_data_key, requests_missing_claims, SessionDataKey, CLAIMS_PROMPT_PAGE,
    MISSING_CLAIMS_PARAM, SESSION_DATA_KEY,
};
