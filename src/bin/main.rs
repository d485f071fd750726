use anyhow::Result;
use clap::{Parser, Subcommand};
use scheme_auth::{
    ApiKeyEntry, AuthenticateResult, AuthenticationService, BearerClaims, ConfiguredSchemes,
    HttpContext, RequestAuthentication, SchemesConfig, encode_token, generate_api_key,
    load_schemes,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scheme-auth")]
#[command(about = "Scheme-based HTTP authentication handlers")]
struct Cli {
    /// Path to schemes.json (defaults to $XDG_CONFIG_HOME/scheme-auth or ./schemes.json)
    #[arg(long, global = true, env = "AUTH_SCHEMES_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the demo HTTP server
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Validate the scheme configuration and list the registered schemes
    CheckConfig,
    /// Authenticate a synthetic request and print the outcome
    Authenticate {
        /// Scheme to authenticate with (defaults to the configured default scheme)
        #[arg(long)]
        scheme: Option<String>,
        /// Request path
        #[arg(long, default_value = "/")]
        path: String,
        /// Request header as "Name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Generate a new API key and print its configuration entry
    GenerateKey {
        /// Human-readable name for this key
        #[arg(long)]
        name: String,
        /// Role granted to this key (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
        /// Number of days until the key expires (omit for no expiration)
        #[arg(long)]
        expires_days: Option<u32>,
    },
    /// Issue an HS256 bearer token for testing
    IssueToken {
        #[arg(long, env = "SCHEME_AUTH_BEARER_SECRET")]
        secret: String,
        #[arg(long)]
        sub: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        issuer: Option<String>,
        /// Role claim (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long, default_value_t = 60)]
        expires_minutes: i64,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<ConfiguredSchemes> {
    match path {
        Some(path) => {
            info!("Loading authentication schemes from {}", path.display());
            SchemesConfig::load(&path)?.build()
        }
        None => load_schemes(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("scheme_auth=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let configured = load_config(cli.config)?;
            info!(
                "Registered schemes: {}",
                configured.registry.scheme_names().join(", ")
            );

            let app = scheme_auth::api::create_router(Arc::new(configured.registry));
            let listener = tokio::net::TcpListener::bind(&bind).await?;

            info!("Server listening on http://{}", bind);
            axum::serve(listener, app).await?;
        }
        Commands::CheckConfig => {
            let configured = load_config(cli.config)?;
            let registry = &configured.registry;

            println!("{:<20} {:<30}", "SCHEME", "DISPLAY NAME");
            println!("{}", "-".repeat(50));
            for name in registry.scheme_names() {
                let display = registry
                    .descriptor(&name)
                    .and_then(|d| d.display_name().map(str::to_string))
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<20} {:<30}", name, display);
            }
            println!();
            println!(
                "Default authenticate: {}",
                registry.default_authenticate_scheme().unwrap_or("-")
            );
            println!(
                "Default challenge:    {}",
                registry.default_challenge_scheme().unwrap_or("-")
            );
            println!(
                "Default forbid:       {}",
                registry.default_forbid_scheme().unwrap_or("-")
            );
        }
        Commands::Authenticate {
            scheme,
            path,
            headers,
        } => {
            let configured = load_config(cli.config)?;

            let mut request = http::Request::get(path.as_str());
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| anyhow::anyhow!("Header `{}` must be `Name: value`", header))?;
                request = request.header(name.trim(), value.trim());
            }
            let context = Arc::new(HttpContext::from_request(request.body(())?));
            let auth = RequestAuthentication::new(Arc::new(configured.registry), context)?;

            let result = match &scheme {
                Some(scheme) => auth.authenticate(scheme).await?,
                None => auth.authenticate_default().await?,
            };

            match result {
                AuthenticateResult::Success(ticket) => {
                    println!("Authenticated by scheme '{}'", ticket.scheme());
                    println!("  Principal: {}", ticket.principal().display());
                    for claim in ticket.principal().claims() {
                        println!("  {} = {} ({})", claim.claim_type, claim.value, claim.issuer);
                    }
                }
                AuthenticateResult::NoResult => println!("No result"),
                AuthenticateResult::Failure { error, .. } => {
                    println!("Authentication failed: {}", error)
                }
            }
        }
        Commands::GenerateKey {
            name,
            roles,
            expires_days,
        } => {
            let (full_key, prefix, key_hash) = generate_api_key();

            let expires_at = expires_days.map(|days| {
                let duration = chrono::Duration::days(days as i64);
                chrono::Utc::now() + duration
            });

            let entry = ApiKeyEntry {
                name,
                key_hash,
                roles,
                expires_at,
            };

            println!("API Key created successfully!");
            println!();
            println!("  Key:     {}", full_key);
            println!("  Prefix:  {}", prefix);
            if let Some(exp) = expires_at {
                println!("  Expires: {}", exp.format("%Y-%m-%d %H:%M:%S UTC"));
            } else {
                println!("  Expires: Never");
            }
            println!();
            println!("Add this entry to the scheme's \"keys\" list:");
            println!("{}", serde_json::to_string_pretty(&entry)?);
            println!();
            println!("IMPORTANT: Save this key now. It cannot be retrieved later.");
            println!("Use with: -H 'X-API-Key: {}'", full_key);
        }
        Commands::IssueToken {
            secret,
            sub,
            name,
            issuer,
            roles,
            expires_minutes,
        } => {
            let now = chrono::Utc::now();
            let claims = BearerClaims {
                sub,
                iss: issuer,
                name,
                roles,
                iat: Some(now.timestamp()),
                exp: Some((now + chrono::Duration::minutes(expires_minutes)).timestamp()),
                ..Default::default()
            };
            println!("{}", encode_token(&secret, &claims)?);
        }
    }

    Ok(())
}
