
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use schedule_client::router::{Location, Navigation, REDIRECT_PARAM, RouteName};
use schedule_client::util::color::{color_for_profile, color_for_user};
use schedule_client::{ApiError, App, AppError, ClientConfig, ConfigError, Credentials};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("startup failed: {0}")]
    App(#[from] AppError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("not signed in; run `schedule-cli login` first")]
    NotSignedIn,
    #[error("no route matches {0}")]
    NotFound(String),
}

#[derive(Parser, Debug)]
#[command(name = "schedule-cli", about = "Schedule calendar client")]
struct Cli {
    /// API base URL; overrides `SCHEDULE_API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Directory holding the session; overrides `SCHEDULE_STATE_DIR`.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SCHEDULE_PASSWORD", hide_env_values = true)]
        password: String,
        /// Route to continue to after signing in.
        #[arg(long)]
        redirect: Option<String>,
    },
    /// Sign out and forget the stored session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Exchange the session cookie for a fresh access token.
    Refresh,
    /// Resolve an application route through the auth guard.
    Open { path: String },
    /// Call the API through the authenticated gateway.
    Api(ApiCommand),
    /// Show the display color assigned to a user id.
    Color { user_id: u64 },
}

#[derive(Args, Debug)]
struct ApiCommand {
    #[command(subcommand)]
    command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
enum ApiSubcommand {
    Get {
        path: String,
    },
    Post {
        path: String,
        #[arg(long, default_value = "{}")]
        data: String,
    },
    Put {
        path: String,
        #[arg(long)]
        data: String,
    },
    Patch {
        path: String,
        #[arg(long)]
        data: String,
    },
    Delete {
        path: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config = config.with_base_url(base_url)?;
    }
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }

    let app = App::new(config)?;
    let result = run_command(&app, cli.command).await;

    // Surface what a view would show in its error banner.
    let notice = app.notice().current();
    if result.is_err() && !notice.is_empty() {
        eprintln!("{}", notice.message);
        app.notice().clear();
    }
    result
}

async fn run_command(app: &App, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password, redirect } => {
            let mut signin = Location::for_route(RouteName::SignIn);
            if let Some(target) = redirect.as_deref() {
                signin = signin.with_query(REDIRECT_PARAM, target);
            }
            app.navigate(&signin.full_path());

            let nav = app.sign_in(&Credentials { email, password }).await?;
            print_json(&json!({
                "user": app.session().user(),
                "location": nav.location().full_path(),
            }))
        }
        Command::Logout => {
            app.session().logout().await;
            print_json(&json!({ "signedOut": true }))
        }
        Command::Whoami => {
            let session = app.session().session();
            if !session.is_authenticated() {
                return Err(CliError::NotSignedIn);
            }
            let color = session.user.as_ref().and_then(color_for_profile);
            print_json(&json!({ "user": session.user, "color": color }))
        }
        Command::Refresh => {
            app.session().refresh().await?;
            print_json(&json!({ "refreshed": true }))
        }
        Command::Open { path } => run_open(app, &path),
        Command::Api(api) => run_api(app, api).await,
        Command::Color { user_id } => print_json(&color_json(user_id)),
    }
}

fn run_open(app: &App, path: &str) -> Result<(), CliError> {
    match app.navigate(path) {
        Navigation::Allow { route, location } => print_json(&json!({
            "outcome": "allow",
            "route": format!("{:?}", route.name),
            "layout": format!("{:?}", route.layout),
            "location": location.full_path(),
        })),
        Navigation::Redirect { location } => print_json(&json!({
            "outcome": "redirect",
            "location": location.full_path(),
        })),
        Navigation::NotFound { location } => Err(CliError::NotFound(location.path)),
    }
}

async fn run_api(app: &App, api: ApiCommand) -> Result<(), CliError> {
    let gateway = app.gateway();
    let value: Value = match api.command {
        ApiSubcommand::Get { path } => gateway.get(&path).await?,
        ApiSubcommand::Post { path, data } => gateway.post(&path, serde_json::from_str(&data)?).await?,
        ApiSubcommand::Put { path, data } => gateway.put(&path, serde_json::from_str(&data)?).await?,
        ApiSubcommand::Patch { path, data } => gateway.patch(&path, serde_json::from_str(&data)?).await?,
        ApiSubcommand::Delete { path } => gateway.delete(&path).await?,
    };
    print_json(&value)
}

fn color_json(user_id: u64) -> Value {
    json!({ "userId": user_id, "color": color_for_user(user_id) })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
