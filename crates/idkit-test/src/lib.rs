//! Test harness for idkit.
//!
//! Provides `MockIdentityServer`, a stateful stand-in for the identity
//! server's claim, application, SCIM2, playground and login endpoints.

mod oidc;
mod rest;
#[cfg(test)]
mod scenarios;
pub mod server;

pub use server::{MockIdentityServer, MockOptions, EVERYONE_ROLE_ID};
