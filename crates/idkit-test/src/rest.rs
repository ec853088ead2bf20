//! Claim, application and SCIM2 endpoints.

use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use idkit_client::dialect_id;

use crate::server::{
    json_error, MockOptions, SharedState, StoredApplication, StoredClaim, StoredUser,
    EMAIL_CLAIM, EVERYONE_ROLE_ID, GIVEN_NAME_CLAIM, LAST_NAME_CLAIM, USERNAME_CLAIM,
};

const SCIM_ERROR_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:Error";
const SCIM_LIST_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
const SCIM_USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

/// Tenant REST APIs behind Basic auth.
pub(crate) struct RestApi {
    state: SharedState,
    options: MockOptions,
}

impl RestApi {
    pub(crate) fn new(state: SharedState, options: MockOptions) -> Self {
        Self { state, options }
    }

    fn authorized(&self, request: &Request) -> bool {
        request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == self.options.authorization())
    }

    fn server_api(&self, request: &Request, rest: &[&str]) -> ResponseTemplate {
        match (request.method.as_str(), rest) {
            ("POST", ["claim-dialects", dialect, "claims"]) => self.add_claim(request, dialect),
            ("GET", ["claim-dialects", dialect, "claims", id]) => self.get_claim(dialect, id),
            ("DELETE", ["claim-dialects", dialect, "claims", id]) => {
                self.delete_claim(dialect, id)
            }
            ("POST", ["applications"]) => self.add_application(request),
            ("GET", ["applications", id, "inbound-protocols", "oidc"]) => self.get_oidc(id),
            ("DELETE", ["applications", id]) => self.delete_application(id),
            _ => json_error(404, "NF-00001", "resource not found"),
        }
    }

    fn scim(&self, request: &Request, rest: &[&str]) -> ResponseTemplate {
        match (request.method.as_str(), rest) {
            ("POST", ["Users"]) => self.create_user(request),
            ("DELETE", ["Users", id]) => self.delete_user(id),
            ("GET", ["v2", "Roles"]) => self.find_roles(request),
            ("PATCH", ["v2", "Roles", id]) => self.patch_role(request, id),
            _ => scim_error(404, "resource not found"),
        }
    }

    fn add_claim(&self, request: &Request, dialect: &str) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return json_error(400, "CMT-50001", "invalid request body");
        };
        let (Some(claim_uri), Some(mapped)) = (
            body["claimURI"].as_str().filter(|s| !s.is_empty()),
            body["mappedLocalClaimURI"]
                .as_str()
                .filter(|s| !s.is_empty()),
        ) else {
            return json_error(400, "CMT-50002", "claimURI and mappedLocalClaimURI are required");
        };

        let claim_id = dialect_id(claim_uri);
        let key = (dialect.to_string(), claim_id.clone());
        let mut state = self.state.lock();
        if state.claims.contains_key(&key) {
            return json_error(409, "CMT-50012", "external claim already exists");
        }
        state.claims.insert(
            key,
            StoredClaim {
                claim_uri: claim_uri.to_string(),
                mapped_local_claim_uri: mapped.to_string(),
            },
        );

        let location = format!("{}/{}", request.url.as_str().trim_end_matches('/'), claim_id);
        ResponseTemplate::new(201).insert_header("Location", location.as_str())
    }

    fn get_claim(&self, dialect: &str, id: &str) -> ResponseTemplate {
        let state = self.state.lock();
        match state.claims.get(&(dialect.to_string(), id.to_string())) {
            Some(claim) => ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "claimURI": claim.claim_uri,
                "mappedLocalClaimURI": claim.mapped_local_claim_uri,
            })),
            None => json_error(404, "CMT-50019", "external claim not found"),
        }
    }

    fn delete_claim(&self, dialect: &str, id: &str) -> ResponseTemplate {
        let removed = self
            .state
            .lock()
            .claims
            .remove(&(dialect.to_string(), id.to_string()));
        match removed {
            Some(_) => ResponseTemplate::new(204),
            None => json_error(404, "CMT-50019", "external claim not found"),
        }
    }

    fn add_application(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return json_error(400, "APP-60001", "invalid request body");
        };
        let Some(name) = body["name"].as_str().filter(|s| !s.is_empty()) else {
            return json_error(400, "APP-60001", "application name is required");
        };

        let oidc = &body["inboundProtocolConfiguration"]["oidc"];
        let application = StoredApplication {
            name: name.to_string(),
            client_id: Uuid::new_v4().simple().to_string(),
            client_secret: Uuid::new_v4().simple().to_string(),
            grant_types: strings(&oidc["grantTypes"]),
            callback_urls: strings(&oidc["callbackURLs"]),
            requested_claims: body["claimConfiguration"]["requestedClaims"]
                .as_array()
                .map(|claims| {
                    claims
                        .iter()
                        .filter_map(|c| c["claim"]["uri"].as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let mut state = self.state.lock();
        if state.applications.values().any(|a| a.name == name) {
            return json_error(409, "APP-60007", "application name already in use");
        }
        let app_id = Uuid::new_v4().to_string();
        state.applications.insert(app_id.clone(), application);

        let location = format!("{}/{}", request.url.as_str().trim_end_matches('/'), app_id);
        ResponseTemplate::new(201).insert_header("Location", location.as_str())
    }

    fn get_oidc(&self, app_id: &str) -> ResponseTemplate {
        let state = self.state.lock();
        match state.applications.get(app_id) {
            Some(app) => ResponseTemplate::new(200).set_body_json(json!({
                "clientId": app.client_id,
                "clientSecret": app.client_secret,
                "grantTypes": app.grant_types,
                "callbackURLs": app.callback_urls,
                "publicClient": false,
            })),
            None => json_error(404, "APP-60006", "application not found"),
        }
    }

    fn delete_application(&self, app_id: &str) -> ResponseTemplate {
        match self.state.lock().applications.remove(app_id) {
            Some(_) => ResponseTemplate::new(204),
            None => json_error(404, "APP-60006", "application not found"),
        }
    }

    fn create_user(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return scim_error(400, "invalid request body");
        };
        let Some(user_name) = body["userName"].as_str().filter(|s| !s.is_empty()) else {
            return scim_error(400, "userName is required");
        };

        let mut claims = vec![USERNAME_CLAIM.to_string()];
        if body["emails"].as_array().is_some_and(|e| !e.is_empty()) {
            claims.push(EMAIL_CLAIM.to_string());
        }
        if body["name"]["givenName"].is_string() {
            claims.push(GIVEN_NAME_CLAIM.to_string());
        }
        if body["name"]["familyName"].is_string() {
            claims.push(LAST_NAME_CLAIM.to_string());
        }

        let mut state = self.state.lock();
        if state.users.values().any(|u| u.user_name == user_name) {
            return scim_error(409, "user already exists");
        }
        let user_id = Uuid::new_v4().to_string();
        state.users.insert(
            user_id.clone(),
            StoredUser {
                user_name: user_name.to_string(),
                password: body["password"].as_str().map(str::to_string),
                claims,
            },
        );

        let location = format!("{}/{}", request.url.as_str().trim_end_matches('/'), user_id);
        ResponseTemplate::new(201)
            .insert_header("Location", location.as_str())
            .set_body_json(json!({
                "schemas": [SCIM_USER_SCHEMA],
                "id": user_id,
                "userName": user_name,
                "meta": {"resourceType": "User", "location": location},
            }))
    }

    fn delete_user(&self, user_id: &str) -> ResponseTemplate {
        let mut state = self.state.lock();
        match state.users.remove(user_id) {
            Some(_) => {
                state.role_members.remove(user_id);
                ResponseTemplate::new(204)
            }
            None => scim_error(404, "user not found"),
        }
    }

    fn find_roles(&self, request: &Request) -> ResponseTemplate {
        let filter = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "filter")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let wanted = filter
            .strip_prefix("displayName eq ")
            .map(|v| v.trim().trim_matches('"'));

        let resources: Vec<Value> = match wanted {
            Some("everyone") | None => {
                vec![json!({"id": EVERYONE_ROLE_ID, "displayName": "everyone"})]
            }
            Some(_) => Vec::new(),
        };
        ResponseTemplate::new(200).set_body_json(json!({
            "schemas": [SCIM_LIST_SCHEMA],
            "totalResults": resources.len(),
            "startIndex": 1,
            "itemsPerPage": resources.len(),
            "Resources": resources,
        }))
    }

    fn patch_role(&self, request: &Request, role_id: &str) -> ResponseTemplate {
        if role_id != EVERYONE_ROLE_ID {
            return scim_error(404, "role not found");
        }
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return scim_error(400, "invalid request body");
        };

        let mut state = self.state.lock();
        for operation in body["Operations"].as_array().into_iter().flatten() {
            if operation["op"] != "add" || operation["path"] != "users" {
                return scim_error(400, "unsupported patch operation");
            }
            for member in operation["value"].as_array().into_iter().flatten() {
                let Some(user_id) = member["value"].as_str() else {
                    return scim_error(400, "member value is required");
                };
                if !state.users.contains_key(user_id) {
                    return scim_error(400, "unknown user");
                }
                state.role_members.insert(user_id.to_string());
            }
        }

        ResponseTemplate::new(200).set_body_json(json!({
            "id": EVERYONE_ROLE_ID,
            "displayName": "everyone",
        }))
    }
}

impl Respond for RestApi {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if !self.authorized(request) {
            return json_error(401, "AUT-10001", "authentication required");
        }

        let segments: Vec<&str> = request
            .url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            ["t", domain, ..] if *domain != self.options.domain => {
                json_error(404, "TNT-10001", "tenant not found")
            }
            ["t", _, "api", "server", "v1", rest @ ..] => self.server_api(request, rest),
            ["t", _, "scim2", rest @ ..] => self.scim(request, rest),
            _ => json_error(404, "NF-00001", "resource not found"),
        }
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn scim_error(status: u16, detail: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "schemas": [SCIM_ERROR_SCHEMA],
        "status": status.to_string(),
        "detail": detail,
    }))
}
