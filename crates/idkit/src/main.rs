//! idkit: drive identity server test operations from the command line.
//!
//! Every subcommand prints its result as JSON on stdout. Diagnostics go to
//! stderr through `idkit-telemetry`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use idkit_client::{
    dialect_id, ClientError, ConfigError, ExternalClaimReq, OidcApplication, OidcTestContext,
    RegisteredApplication, TestkitConfig, UserObject,
};
use idkit_telemetry::{LogFormat, Telemetry, TelemetryConfig, TelemetryError, UnknownLogFormat};

/// Exit code for request and status failures.
const EXIT_FAILURE: u8 = 1;
/// Exit code for configuration errors (clap uses 2 for usage errors).
const EXIT_CONFIG: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "idkit", about = "Identity server integration test kit", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "IDKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Server root URL, e.g. https://localhost:9853/.
    #[arg(long, global = true, env = "IDKIT_BACKEND_URL")]
    backend_url: Option<String>,

    /// Tenant admin username.
    #[arg(long, global = true, env = "IDKIT_USERNAME")]
    username: Option<String>,

    /// Tenant admin password.
    #[arg(long, global = true, env = "IDKIT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Tenant domain.
    #[arg(long, global = true, env = "IDKIT_TENANT_DOMAIN")]
    tenant_domain: Option<String>,

    /// Playground URL template containing `{path}`.
    #[arg(long, global = true, env = "IDKIT_TARGET_APPLICATION_URL")]
    target_application_url: Option<String>,

    /// Log level.
    #[arg(long, global = true, env = "IDKIT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty or json).
    #[arg(long, global = true, env = "IDKIT_LOG_FORMAT")]
    log_format: Option<String>,

    /// Accept self-signed server certificates.
    #[arg(long, global = true, env = "IDKIT_INSECURE")]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage external claims.
    Claim {
        #[command(subcommand)]
        action: ClaimCommand,
    },

    /// Manage OIDC applications.
    App {
        #[command(subcommand)]
        action: AppCommand,
    },

    /// Manage SCIM2 users.
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Run the browser-less authorization flow.
    Flow {
        #[command(subcommand)]
        action: FlowCommand,
    },
}

/// Claim dialect, by URI or by id.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct DialectArgs {
    /// Dialect URI; encoded to its id.
    #[arg(long)]
    dialect_uri: Option<String>,

    /// Dialect id as used in API paths (e.g. `local`).
    #[arg(long)]
    dialect_id: Option<String>,
}

impl DialectArgs {
    fn id(&self) -> String {
        match (&self.dialect_id, &self.dialect_uri) {
            (Some(id), _) => id.clone(),
            (None, Some(uri)) => dialect_id(uri),
            (None, None) => String::new(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum ClaimCommand {
    /// Add an external claim mapped to a local claim.
    Add {
        #[command(flatten)]
        dialect: DialectArgs,

        /// External claim URI.
        #[arg(long)]
        claim_uri: String,

        /// Local claim URI it maps to.
        #[arg(long)]
        mapped_local_claim_uri: String,
    },

    /// Print an external claim.
    Get {
        #[command(flatten)]
        dialect: DialectArgs,

        /// Claim id.
        #[arg(long)]
        id: String,
    },

    /// Delete an external claim.
    Delete {
        #[command(flatten)]
        dialect: DialectArgs,

        /// Claim id.
        #[arg(long)]
        id: String,
    },
}

/// Application to register.
#[derive(Args, Debug)]
struct ApplicationArgs {
    /// Application name.
    #[arg(long)]
    name: String,

    /// Playground context path (default: `/{name}`).
    #[arg(long)]
    context: Option<String>,

    /// Registered callback URL.
    #[arg(long)]
    callback_url: String,

    /// Required claim URI (repeatable).
    #[arg(long = "claim")]
    claims: Vec<String>,
}

impl ApplicationArgs {
    fn to_application(&self) -> OidcApplication {
        let context = self
            .context
            .clone()
            .unwrap_or_else(|| format!("/{}", self.name));
        self.claims.iter().fold(
            OidcApplication::new(&self.name, context, &self.callback_url),
            |app, claim| app.with_required_claim(claim),
        )
    }
}

#[derive(Subcommand, Debug)]
enum AppCommand {
    /// Create an application and print its client credentials.
    Create {
        #[command(flatten)]
        application: ApplicationArgs,
    },

    /// Delete an application.
    Delete {
        /// Application id.
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Create a user and add it to the `everyone` role.
    Create {
        #[arg(long)]
        user_name: String,

        /// Password of the new user.
        #[arg(long)]
        user_password: String,

        /// Primary email address.
        #[arg(long)]
        email: Option<String>,

        #[arg(long, requires = "family_name")]
        given_name: Option<String>,

        #[arg(long, requires = "given_name")]
        family_name: Option<String>,
    },

    /// Delete a user.
    Delete {
        /// User id.
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum FlowCommand {
    /// Register a temporary application and run the authorization flow
    /// against it.
    ///
    /// Without login credentials only the first step runs. With them the
    /// login form is submitted and a subsequent request must yield an
    /// authorization code without a missing-claims prompt.
    Authorize {
        #[command(flatten)]
        application: ApplicationArgs,

        /// User to log in as.
        #[arg(long, requires = "login_password")]
        login_user: Option<String>,

        #[arg(long, requires = "login_user")]
        login_password: Option<String>,

        /// Keep the application instead of deleting it afterwards.
        #[arg(long)]
        keep: bool,
    },
}

/// Failure of a command, mapped to an exit code.
enum CommandError {
    Config(ConfigError),
    Client(ClientError),
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ClientError> for CommandError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Config(e) => Self::Config(e),
            other => Self::Client(other),
        }
    }
}

impl CommandError {
    fn report(&self) -> ExitCode {
        match self {
            Self::Config(e) => {
                eprintln!("error: {}", e);
                ExitCode::from(EXIT_CONFIG)
            }
            Self::Client(e) => {
                eprintln!("error: {}", e);
                ExitCode::from(EXIT_FAILURE)
            }
        }
    }
}

/// Layer command-line flags and environment over the config file.
fn load_config(cli: &Cli) -> Result<TestkitConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => TestkitConfig::from_file(path)?,
        None => TestkitConfig::new(),
    };

    if let Some(url) = &cli.backend_url {
        config.server.backend_url = url.clone();
    }
    if let Some(username) = &cli.username {
        config.tenant.username = username.clone();
    }
    if let Some(password) = &cli.password {
        config.tenant.password = password.clone();
    }
    if let Some(domain) = &cli.tenant_domain {
        config.tenant.domain = domain.clone();
    }
    if let Some(template) = &cli.target_application_url {
        config.flow.target_application_url = template.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    if cli.insecure {
        config.server.insecure = true;
    }

    config.validate()?;
    Ok(config)
}

fn init_telemetry(config: &TestkitConfig) -> Result<Telemetry, ConfigError> {
    let format: LogFormat = config
        .logging
        .format
        .parse()
        .map_err(|e: UnknownLogFormat| ConfigError::Invalid {
            key: "logging.format",
            reason: e.to_string(),
        })?;
    let telemetry_config = TelemetryConfig::new()
        .with_filter(&config.logging.level)
        .with_format(format);

    match Telemetry::init(telemetry_config.clone()) {
        Ok(telemetry) => Ok(telemetry),
        Err(TelemetryError::InvalidFilter { reason, .. }) => Err(ConfigError::Invalid {
            key: "logging.level",
            reason,
        }),
        // A subscriber may already be installed when embedded; keep going without ours
        Err(TelemetryError::LoggingInit(_)) => Ok(Telemetry::external(telemetry_config)),
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("error: failed to render output: {}", e),
    }
}

async fn run_claim(ctx: &OidcTestContext, action: ClaimCommand) -> Result<(), CommandError> {
    match action {
        ClaimCommand::Add {
            dialect,
            claim_uri,
            mapped_local_claim_uri,
        } => {
            let req = ExternalClaimReq::new(claim_uri, mapped_local_claim_uri);
            let id = ctx.claims().add_external_claim(&dialect.id(), &req).await?;
            print_json(&json!({ "id": id, "dialectId": dialect.id() }));
        }
        ClaimCommand::Get { dialect, id } => {
            let claim = ctx.claims().get_external_claim(&dialect.id(), &id).await?;
            print_json(&claim);
        }
        ClaimCommand::Delete { dialect, id } => {
            ctx.claims().delete_external_claim(&dialect.id(), &id).await?;
            print_json(&json!({ "deleted": id }));
        }
    }
    Ok(())
}

async fn run_app(ctx: &OidcTestContext, action: AppCommand) -> Result<(), CommandError> {
    match action {
        AppCommand::Create { application } => {
            let app = ctx.create_application(application.to_application()).await?;
            print_json(&application_json(&app));
        }
        AppCommand::Delete { id } => {
            ctx.applications().delete_application(&id).await?;
            print_json(&json!({ "deleted": id }));
        }
    }
    Ok(())
}

async fn run_user(ctx: &OidcTestContext, action: UserCommand) -> Result<(), CommandError> {
    match action {
        UserCommand::Create {
            user_name,
            user_password,
            email,
            given_name,
            family_name,
        } => {
            let mut user = UserObject::new(user_name).with_password(user_password);
            if let (Some(given), Some(family)) = (given_name, family_name) {
                user = user.with_name(given, family);
            }
            if let Some(email) = email {
                user = user.with_primary_email(email);
            }

            let provisioned = ctx.create_user(&user).await?;
            print_json(&json!({
                "userId": provisioned.user_id,
                "roleId": provisioned.role_id,
                "userName": provisioned.user_name,
            }));
        }
        UserCommand::Delete { id } => {
            ctx.scim().delete_user(&id).await?;
            print_json(&json!({ "deleted": id }));
        }
    }
    Ok(())
}

async fn run_flow(ctx: &OidcTestContext, action: FlowCommand) -> Result<(), CommandError> {
    let FlowCommand::Authorize {
        application,
        login_user,
        login_password,
        keep,
    } = action;

    let app = ctx.create_application(application.to_application()).await?;
    let login = login_user.zip(login_password);
    let outcome = authorize(ctx, &app, login).await;

    if !keep {
        let app_id = app.application_id().to_string();
        if let Err(e) = ctx.delete_application(app).await {
            tracing::warn!(app_id = %app_id, error = %e, "failed to delete temporary application");
        }
    }

    print_json(&outcome?);
    Ok(())
}

async fn authorize(
    ctx: &OidcTestContext,
    app: &RegisteredApplication,
    login: Option<(String, String)>,
) -> Result<serde_json::Value, ClientError> {
    let flow = ctx.authorization_flow()?;
    let session = flow.first_authentication_request(app).await?;

    let mut result = json!({
        "applicationId": app.application_id(),
        "clientId": app.client_id(),
        "sessionDataKey": session.as_str(),
    });

    if let Some((username, password)) = login {
        flow.login(&session, &username, &password).await?;
        let target = flow.subsequent_authentication_request(app, &session).await?;
        let code = target
            .authorization_code()
            .ok_or_else(|| ClientError::MissingResponseField {
                field: "code",
                context: format!("redirect to {}", target.as_str()),
            })?;
        result["redirect"] = json!(target.as_str());
        result["authorizationCode"] = json!(code);
    }
    Ok(result)
}

fn application_json(app: &RegisteredApplication) -> serde_json::Value {
    json!({
        "applicationId": app.application_id(),
        "name": app.application().name,
        "clientId": app.client_id(),
        "clientSecret": app.client_secret(),
    })
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    let config = load_config(&cli)?;
    let _telemetry = init_telemetry(&config)?;
    let ctx = OidcTestContext::new(config)?;

    match cli.command {
        Commands::Claim { action } => run_claim(&ctx, action).await,
        Commands::App { action } => run_app(&ctx, action).await,
        Commands::User { action } => run_user(&ctx, action).await,
        Commands::Flow { action } => run_flow(&ctx, action).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => e.report(),
    }
}
