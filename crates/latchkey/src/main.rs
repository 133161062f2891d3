use std::path::PathBuf;

use clap::{Parser, Subcommand};
use latchkey::oauth::api::{DEFAULT_API_BASE_URL, ENV_API_URL, inspect_access_token};
use latchkey::oauth::config::{ENV_AUDIENCE, ENV_CLIENT_ID, ENV_DOMAIN, ENV_ORIGIN, ENV_SCOPE};
use latchkey::{ApiClient, AuthConfig, AuthManager, AuthState, Effect, FileStorage};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Latchkey - OAuth2/OIDC PKCE session manager")]
struct Args {
    /// OAuth client ID registered with the provider
    #[arg(long, env = ENV_CLIENT_ID)]
    client_id: String,

    /// Provider base URL (e.g., https://my-instance.zitadel.cloud)
    #[arg(long, env = ENV_DOMAIN)]
    domain: Url,

    /// Application origin; the redirect URI is `{origin}/callback`
    #[arg(long, env = ENV_ORIGIN)]
    origin: Url,

    /// API audience (recorded, not sent)
    #[arg(long, env = ENV_AUDIENCE)]
    audience: Option<String>,

    /// Requested scopes
    #[arg(long, env = ENV_SCOPE)]
    scope: Option<String>,

    /// Backend API base URL
    #[arg(long, env = ENV_API_URL, default_value = DEFAULT_API_BASE_URL)]
    api_url: Url,

    /// Session file
    #[arg(long, default_value = ".latchkey/session.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether a session is active
    Status,
    /// Print the authorization URL that starts a login
    Login {
        /// In-app location to come back to after login
        #[arg(long)]
        return_to: Option<String>,
        /// Open the URL in the system browser
        #[arg(long)]
        open: bool,
    },
    /// Complete a login from the URL the provider redirected to
    Callback { url: Url },
    /// Drop the session and print the provider's logout URL
    Logout,
    /// Print the stored access token
    Token,
    /// Fetch the user profile from the backend
    Profile,
    /// Fetch the protected resource from the backend
    Resource,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(EnvFilter::from_env("LATCHKEY_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AuthConfig::new(args.client_id, args.domain, args.origin)?;
    if let Some(audience) = args.audience {
        config = config.with_audience(audience);
    }
    if let Some(scope) = args.scope {
        config = config.with_scope(scope);
    }

    let manager = AuthManager::new(config, FileStorage::new(&args.store), reqwest::Client::new());
    let state = manager.restore();

    match args.command {
        Command::Status => match state {
            AuthState::Authenticated { user } => {
                let name = user
                    .as_ref()
                    .and_then(|u| u.display_name())
                    .unwrap_or("unknown user");
                println!("logged in as {name}");
            }
            _ => println!("not logged in"),
        },
        Command::Login { return_to, open } => {
            if let Effect::Redirect(url) = manager.enter_login_route(return_to.as_deref())? {
                println!("already logged in, continue at {url}");
                return Ok(());
            }
            follow(manager.login("/")?, open);
        }
        Command::Callback { url } => {
            if !manager.is_callback(&url) {
                miette::bail!("{url} is not this application's callback URL");
            }
            match manager.handle_callback_url(&url).await? {
                Effect::Redirect(target) => println!("logged in, continue at {target}"),
                Effect::None => println!("callback carried no code, nothing to do"),
            }
        }
        Command::Logout => follow(manager.logout(), false),
        Command::Token => {
            let token = manager.access_token();
            inspect_access_token(token.as_deref());
            match token {
                Some(token) => println!("{token}"),
                None => miette::bail!("no access token stored"),
            }
        }
        Command::Profile => {
            let api = ApiClient::new(manager.authenticated_client()).with_base_url(args.api_url);
            let profile = api.get_user_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile).into_diagnostic()?);
        }
        Command::Resource => {
            let api = ApiClient::new(manager.authenticated_client()).with_base_url(args.api_url);
            let resource = api.fetch_protected_resource().await?;
            println!("{}", serde_json::to_string_pretty(&resource).into_diagnostic()?);
        }
    }

    Ok(())
}

fn follow(effect: Effect, open: bool) {
    if let Effect::Redirect(url) = effect {
        println!("{url}");
        if open && !try_open_in_browser(url.as_str()) {
            tracing::warn!("could not open a browser, visit the URL above");
        }
    }
}

#[cfg(feature = "browser-open")]
fn try_open_in_browser(url: &str) -> bool {
    webbrowser::open(url).is_ok()
}
#[cfg(not(feature = "browser-open"))]
fn try_open_in_browser(_url: &str) -> bool {
    false
}
