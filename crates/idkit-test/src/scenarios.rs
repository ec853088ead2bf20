//! End-to-end scenarios: idkit clients against `MockIdentityServer`.

use idkit_client::{
    dialect_id, ClaimManagementClient, ClientError, ExternalClaimReq, FlowOutcome, FlowStep,
    OidcApplication, OidcTestContext, TestkitConfig, UserObject, LOCAL_DIALECT_ID,
};

use crate::server::{MockIdentityServer, MockOptions, EMAIL_CLAIM, USERNAME_CLAIM};

const EXTERNAL_DIALECT: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity";

fn config(server: &MockIdentityServer) -> TestkitConfig {
    TestkitConfig::new()
        .with_backend_url(server.backend_url())
        .with_target_application_url(server.target_application_url())
}

fn context(server: &MockIdentityServer) -> OidcTestContext {
    OidcTestContext::new(config(server)).expect("context")
}

fn playground(name: &str) -> OidcApplication {
    OidcApplication::new(
        name,
        format!("/{}", name),
        format!("http://localhost:8490/{}/oauth2client", name),
    )
}

#[tokio::test]
async fn test_get_after_add_returns_submitted_claim_uri() {
    let server = MockIdentityServer::start().await;
    let claims = ClaimManagementClient::from_config(&config(&server)).expect("client");
    let dialect = dialect_id(EXTERNAL_DIALECT);
    let req = ExternalClaimReq::new(
        format!("{}/claims/department", EXTERNAL_DIALECT),
        "http://wso2.org/claims/department",
    );

    let claim_id = claims
        .add_external_claim(&dialect, &req)
        .await
        .expect("claim created");
    let claim = claims
        .get_external_claim(&dialect, &claim_id)
        .await
        .expect("claim fetched");

    assert_eq!(claim["claimURI"], req.claim_uri.as_str());
    assert_eq!(claim["mappedLocalClaimURI"], "http://wso2.org/claims/department");

    claims
        .delete_external_claim(&dialect, &claim_id)
        .await
        .expect("claim deleted");
    assert_eq!(server.claim_count(), 0);
}

#[tokio::test]
async fn test_duplicate_claim_is_rejected() {
    let server = MockIdentityServer::start().await;
    let claims = ClaimManagementClient::from_config(&config(&server)).expect("client");
    let req = ExternalClaimReq::new("urn:idkit:claim", "http://wso2.org/claims/username");

    claims
        .add_external_claim(LOCAL_DIALECT_ID, &req)
        .await
        .expect("first add");
    let err = claims
        .add_external_claim(LOCAL_DIALECT_ID, &req)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::UnexpectedStatus { actual: 409, .. }
    ));
}

#[tokio::test]
async fn test_delete_unknown_claim_fails() {
    let server = MockIdentityServer::start().await;
    let claims = ClaimManagementClient::from_config(&config(&server)).expect("client");

    let err = claims
        .delete_external_claim(&dialect_id(EXTERNAL_DIALECT), "bm8tc3VjaC1jbGFpbQ")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::UnexpectedStatus {
            actual: 404,
            ..
        }
    ));
}

#[tokio::test]
async fn test_wrong_credentials_are_unauthorized() {
    let server = MockIdentityServer::start().await;
    let config = config(&server).with_tenant("admin", "not-admin", "carbon.super");
    let claims = ClaimManagementClient::from_config(&config).expect("client");

    let err = claims
        .get_external_claim(LOCAL_DIALECT_ID, "any")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::UnexpectedStatus { actual: 401, .. }
    ));
}

#[tokio::test]
async fn test_other_tenant_domain() {
    let server = MockIdentityServer::start_with(MockOptions::new("root", "s3cret", "wso2.com")).await;
    let config = config(&server).with_tenant("root", "s3cret", "wso2.com");
    let claims = ClaimManagementClient::from_config(&config).expect("client");

    assert!(claims.base_path().ends_with("/t/wso2.com/api/server/v1"));
    claims
        .add_external_claim(LOCAL_DIALECT_ID, &ExternalClaimReq::new("urn:a", "urn:b"))
        .await
        .expect("claim created in tenant");
}

#[tokio::test]
async fn test_created_application_has_client_credentials() {
    let server = MockIdentityServer::start().await;
    let ctx = context(&server);

    let app = ctx
        .create_application(playground("app1").with_required_claim(USERNAME_CLAIM))
        .await
        .expect("application created");

    assert!(!app.client_id().is_empty());
    assert!(!app.client_secret().is_empty());
    assert!(!app.application_id().is_empty());
    assert_eq!(server.application_count(), 1);

    ctx.delete_application(app).await.expect("deleted");
    assert_eq!(server.application_count(), 0);
}

#[tokio::test]
async fn test_provisioned_user_joins_everyone_role() {
    let server = MockIdentityServer::start().await;
    let ctx = context(&server);

    let user = ctx
        .create_user(&UserObject::new("oidcuser").with_password("Oidcuser@123"))
        .await
        .expect("user created");
    assert_eq!(server.role_members(), vec![user.user_id.clone()]);

    ctx.delete_user(user).await.expect("user deleted");
    assert_eq!(server.user_count(), 0);
    assert!(server.role_members().is_empty());
}

#[tokio::test]
async fn test_first_request_yields_session_data_key() {
    let server = MockIdentityServer::start().await;
    let ctx = context(&server);
    let app = ctx
        .create_application(playground("playground2"))
        .await
        .expect("application created");

    let flow = ctx.authorization_flow().expect("flow");
    let outcome = flow
        .send_authentication_request(&app, &FlowStep::Initial)
        .await
        .expect("initial step");

    match outcome {
        FlowOutcome::SessionStarted(key) => assert!(!key.as_str().is_empty()),
        other => panic!("expected a session, got {:?}", other),
    }
    assert_eq!(server.pending_sessions(), 1);
}

#[tokio::test]
async fn test_login_then_subsequent_request_returns_code() {
    let server = MockIdentityServer::start().await;
    let ctx = context(&server);
    let app = ctx
        .create_application(playground("playground2").with_required_claim(USERNAME_CLAIM))
        .await
        .expect("application created");
    let user = ctx
        .create_user(&UserObject::new("oidcuser").with_password("Oidcuser@123"))
        .await
        .expect("user created");

    let flow = ctx.authorization_flow().expect("flow");
    let session = flow
        .first_authentication_request(&app)
        .await
        .expect("session");
    let after_login = flow
        .login(&session, "oidcuser", "Oidcuser@123")
        .await
        .expect("login");
    assert_eq!(after_login.url().path(), "/oauth2/authorize");

    let target = flow
        .subsequent_authentication_request(&app, &session)
        .await
        .expect("no claims prompt");
    assert!(target.authorization_code().is_some());
    assert!(target
        .as_str()
        .starts_with("http://localhost:8490/playground2/oauth2client"));
    // Issuing the code closes the session the login completed
    assert_eq!(server.pending_sessions(), 0);

    // The code was issued to a request carrying the login cookie
    let authorize_requests: Vec<_> = server
        .received_requests()
        .await
        .into_iter()
        .filter(|r| r.url.path() == "/oauth2/authorize")
        .collect();
    assert_eq!(authorize_requests.len(), 2);
    let cookie = authorize_requests[1]
        .headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.contains("commonAuthId="));

    ctx.delete_user(user).await.expect("user deleted");
    ctx.delete_application(app).await.expect("app deleted");
}

#[tokio::test]
async fn test_missing_claims_prompt_is_an_error() {
    let server = MockIdentityServer::start().await;
    let ctx = context(&server);
    let app = ctx
        .create_application(playground("playground3").with_required_claim(EMAIL_CLAIM))
        .await
        .expect("application created");
    // No email, so the email claim has no value
    ctx.create_user(&UserObject::new("noemail").with_password("Noemail@123"))
        .await
        .expect("user created");

    let flow = ctx.authorization_flow().expect("flow");
    let session = flow
        .first_authentication_request(&app)
        .await
        .expect("session");
    flow.login(&session, "noemail", "Noemail@123")
        .await
        .expect("login");
    assert_eq!(server.pending_sessions(), 1);

    let err = flow
        .subsequent_authentication_request(&app, &session)
        .await
        .unwrap_err();
    match err {
        ClientError::MissingClaimsPrompt { location } => {
            assert!(location.contains("claims.do"));
            assert!(location.contains("missingClaims"));
        }
        other => panic!("expected MissingClaimsPrompt, got {:?}", other),
    }
}

#[tokio::test]
async fn test_subsequent_request_without_login_gets_no_code() {
    let server = MockIdentityServer::start().await;
    let ctx = context(&server);
    let app = ctx
        .create_application(playground("playground2"))
        .await
        .expect("application created");

    let flow = ctx.authorization_flow().expect("flow");
    let session = flow
        .first_authentication_request(&app)
        .await
        .expect("session");
    let target = flow
        .subsequent_authentication_request(&app, &session)
        .await
        .expect("redirected");

    assert!(target.authorization_code().is_none());
    assert_eq!(target.url().path(), "/authenticationendpoint/login.do");
}

#[tokio::test]
async fn test_failed_login_returns_to_login_page() {
    let server = MockIdentityServer::start().await;
    let ctx = context(&server);
    let app = ctx
        .create_application(playground("playground2"))
        .await
        .expect("application created");

    let flow = ctx.authorization_flow().expect("flow");
    let session = flow
        .first_authentication_request(&app)
        .await
        .expect("session");
    let target = flow
        .login(&session, "admin", "wrong")
        .await
        .expect("redirected");

    assert_eq!(target.url().path(), "/authenticationendpoint/login.do");
    assert_eq!(target.query_param("authFailure").as_deref(), Some("true"));
}

#[tokio::test]
async fn test_flows_keep_separate_sessions() {
    let server = MockIdentityServer::start().await;
    let ctx = context(&server);
    let app = ctx
        .create_application(playground("playground2"))
        .await
        .expect("application created");

    let first = ctx.authorization_flow().expect("flow");
    let session = first
        .first_authentication_request(&app)
        .await
        .expect("session");
    first
        .login(&session, "admin", "admin")
        .await
        .expect("login");

    // A second flow has no login cookie and lands on the login page again
    let second = ctx.authorization_flow().expect("flow");
    let target = second
        .subsequent_authentication_request(&app, &session)
        .await
        .expect("redirected");
    assert!(target.authorization_code().is_none());
}
