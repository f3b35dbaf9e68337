use anyhow::Result;
use chat_gateway::{AuthConfig, AuthMode, create_directory, create_state};
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chat-gateway")]
#[command(about = "Authenticated API gateway for the chat application")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Server {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
        bind: String,
        #[command(flatten)]
        auth: AuthArgs,
        /// Base URL of the remote user directory (in-memory directory when omitted)
        #[arg(long, env = "DIRECTORY_URL")]
        directory_url: Option<String>,
        /// Comma-separated list of allowed CORS origins (permissive when omitted)
        #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
        allowed_origins: Vec<String>,
    },
    /// Verify a token once and print the resulting principal
    Verify {
        /// The bearer token, without the `Bearer ` prefix
        token: String,
        #[command(flatten)]
        auth: AuthArgs,
        #[arg(long, env = "DIRECTORY_URL")]
        directory_url: Option<String>,
    },
}

#[derive(clap::Args)]
struct AuthArgs {
    /// Token verification mode
    #[arg(long, env = "AUTH_MODE", value_enum, default_value_t = AuthMode::Strict)]
    auth_mode: AuthMode,
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,
    #[arg(long, env = "COGNITO_USER_POOL_ID")]
    user_pool_id: String,
    /// App client id, the expected token audience
    #[arg(long, env = "COGNITO_USER_POOL_CLIENT_ID", default_value = "")]
    client_id: String,
    /// Override for the JWKS endpoint
    #[arg(long, env = "JWKS_URL")]
    jwks_url: Option<String>,
    /// Clock skew tolerated on token expiry, in seconds
    #[arg(long, env = "AUTH_LEEWAY_SECS", default_value_t = 0)]
    leeway_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_gateway=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            bind,
            auth,
            directory_url,
            allowed_origins,
        } => {
            info!("Starting gateway on {}", bind);

            let auth_config = build_auth_config(auth);
            let directory = create_directory(directory_url.as_deref())?;
            let state = create_state(&auth_config, directory)?;
            let cors = chat_gateway::api::cors_layer(&allowed_origins)?;

            if allowed_origins.is_empty() {
                warn!("ALLOWED_ORIGINS not set, CORS is permissive");
            } else {
                info!("CORS origins: {}", allowed_origins.join(", "));
            }

            chat_gateway::server::start_http(&bind, state, cors).await?;
        }
        Commands::Verify {
            token,
            auth,
            directory_url,
        } => {
            let auth_config = build_auth_config(auth);
            let directory = create_directory(directory_url.as_deref())?;
            let state = create_state(&auth_config, directory)?;

            let header = format!("Bearer {}", token);
            match state.authenticator.authenticate(Some(&header)).await {
                Ok(principal) => {
                    println!("Subject:  {}", principal.subject());
                    println!("Username: {}", principal.username());
                    println!("Email:    {}", principal.email());
                    let groups: Vec<&str> =
                        principal.groups().iter().map(String::as_str).collect();
                    println!("Groups:   {}", groups.join(", "));
                    println!(
                        "Admin:    {}",
                        chat_gateway::auth::is_privileged(&principal)
                    );
                }
                Err(err) => {
                    println!("Rejected ({}): {}", err.status_code(), err);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Build authentication configuration from CLI arguments.
fn build_auth_config(args: AuthArgs) -> AuthConfig {
    let config = AuthConfig {
        mode: args.auth_mode,
        jwks_url: args.jwks_url,
        leeway_secs: args.leeway_secs,
        ..AuthConfig::cognito(args.region, args.user_pool_id, args.client_id)
    };

    match config.mode {
        AuthMode::Strict => {
            info!(
                "JWT authentication enabled (RS256 with JWKS at {})",
                config.jwks_url()
            );
        }
        AuthMode::Permissive => {
            info!("Permissive authentication: expiry, issuer and directory checks only");
        }
    }

    if config.leeway_secs > 0 {
        info!("Token expiry leeway: {}s", config.leeway_secs);
    }

    config
}
