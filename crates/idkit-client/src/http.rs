//! Authenticated JSON client for the identity server REST APIs.
//!
//! Every request is scoped: the response body is read to the end before
//! [`RestResponse`] is returned, so the connection goes back to the pool
//! whatever the outcome.

use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;

use idkit_telemetry::{log_request_completed, log_unexpected_status};

use crate::config::ServerConfig;
use crate::credentials::TenantCredentials;
use crate::error::ClientError;

/// Tenant-qualified prefix, `t/{domain}`.
const TENANT_PATH: &str = "t";

/// JSON media type sent with every REST call.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Build the tenant-scoped base path `{backend}/t/{domain}{api_root}`.
pub fn tenant_base_path(backend_url: &str, domain: &str, api_root: &str) -> String {
    format!(
        "{}/{}/{}{}",
        backend_url.trim_end_matches('/'),
        TENANT_PATH,
        domain,
        api_root
    )
}

/// Build a `reqwest` client from the server settings.
///
/// `jar` attaches a cookie store; pass the same jar to several clients to
/// share one session between them.
pub fn build_http_client(
    server: &ServerConfig,
    redirect: Policy,
    jar: Option<Arc<Jar>>,
) -> Result<Client, ClientError> {
    let mut builder = Client::builder()
        .connect_timeout(server.connect_timeout())
        .timeout(server.request_timeout())
        .danger_accept_invalid_certs(server.insecure)
        .redirect(redirect);

    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }

    builder.build().map_err(ClientError::Build)
}

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct RestResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl RestResponse {
    /// Read a response to the end, releasing its connection.
    pub async fn read(response: reqwest::Response) -> Result<Self, ClientError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Location` header.
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Body as (lossy) UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Identifier of a created resource: the last path segment of `Location`.
    pub fn created_id(&self, context: &str) -> Result<String, ClientError> {
        self.location()
            .and_then(last_path_segment)
            .map(str::to_string)
            .ok_or_else(|| ClientError::MissingResponseField {
                field: "Location",
                context: context.to_string(),
            })
    }
}

/// Last non-empty path segment of a URL or path, ignoring query and fragment.
pub fn last_path_segment(location: &str) -> Option<&str> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Require an exact status code.
pub fn expect_status(
    response: RestResponse,
    expected: u16,
    operation: &'static str,
) -> Result<RestResponse, ClientError> {
    if response.status == expected {
        return Ok(response);
    }
    log_unexpected_status!(operation, expected, actual = response.status);
    Err(ClientError::UnexpectedStatus {
        operation,
        expected: expected.to_string(),
        actual: response.status,
        body: response.text(),
    })
}

/// Require any 2xx status code.
pub fn expect_success(
    response: RestResponse,
    operation: &'static str,
) -> Result<RestResponse, ClientError> {
    if response.is_success() {
        return Ok(response);
    }
    log_unexpected_status!(operation, expected = "2xx", actual = response.status);
    Err(ClientError::UnexpectedStatus {
        operation,
        expected: "2xx".to_string(),
        actual: response.status,
        body: response.text(),
    })
}

/// Serialize a request payload.
pub fn to_json_string<T: Serialize>(value: &T) -> Result<String, ClientError> {
    Ok(serde_json::to_string(value)?)
}

/// Parse a JSON document.
pub fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, ClientError> {
    Ok(serde_json::from_str(raw)?)
}

/// REST client bound to one base path and one set of credentials.
///
/// Each request carries `Authorization: Basic ...` and
/// `Content-Type: application/json`; extra headers passed per call are
/// applied on top and win on conflict.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_path: String,
    credentials: TenantCredentials,
}

impl RestClient {
    pub fn new(client: Client, base_path: impl Into<String>, credentials: TenantCredentials) -> Self {
        Self {
            client,
            base_path: base_path.into(),
            credentials,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn credentials(&self) -> &TenantCredentials {
        &self.credentials
    }

    /// Full URL of a resource path relative to the base path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_path, path)
    }

    /// GET a resource.
    pub async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<RestResponse, ClientError> {
        self.send(Method::GET, path, None, headers).await
    }

    /// POST a JSON body.
    pub async fn post(
        &self,
        path: &str,
        body: String,
        headers: &[(&str, &str)],
    ) -> Result<RestResponse, ClientError> {
        self.send(Method::POST, path, Some(body), headers).await
    }

    /// PATCH with a JSON body.
    pub async fn patch(
        &self,
        path: &str,
        body: String,
        headers: &[(&str, &str)],
    ) -> Result<RestResponse, ClientError> {
        self.send(Method::PATCH, path, Some(body), headers).await
    }

    /// DELETE a resource.
    pub async fn delete(
        &self,
        path: &str,
        headers: &[(&str, &str)],
    ) -> Result<RestResponse, ClientError> {
        self.send(Method::DELETE, path, None, headers).await
    }

    fn request_headers(&self, extra: &[(&str, &str)]) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&self.credentials.basic_auth_header())
            .map_err(|_| ClientError::InvalidHeader("authorization".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidHeader(format!("{}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidHeader(format!("{}: {}", name, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        extra_headers: &[(&str, &str)],
    ) -> Result<RestResponse, ClientError> {
        let url = self.url(path);
        let headers = self.request_headers(extra_headers)?;

        let mut request = self.client.request(method.clone(), &url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = RestResponse::read(request.send().await?).await?;
        log_request_completed!(method = %method, url = %url, status = response.status);
        Ok(response)
    }
}
