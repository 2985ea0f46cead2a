//! dealboard-auth -- drive the Dealboard session lifecycle from a terminal.
//!
//! Each invocation restores the stored session first (native platform keeps
//! tokens in the configured token store between runs), then runs one
//! command against the backend.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use dealboard_auth::auth::{AuthorizationResponse, ExchangeOutcome, RestoreOutcome};
use dealboard_auth::{Config, SessionClient};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

enum Command {
    Restore,
    Login { email: String, password: String },
    Register { name: String, email: String, password: String },
    Logout,
    Whoami,
    AuthorizeUrl,
    OAuth,
    ChangeName { name: String },
    OnboardingDone,
}

struct CliArgs {
    config_path: PathBuf,
    command: Command,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("dealboard.toml");
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    fail("--config requires a path argument");
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("dealboard-auth {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other if other.starts_with('-') => fail(&format!("Unknown argument: {other}")),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("restore") => Command::Restore,
        Some("login") => Command::Login {
            email: required(positional.next(), "email"),
            password: required(positional.next(), "password"),
        },
        Some("register") => Command::Register {
            name: required(positional.next(), "name"),
            email: required(positional.next(), "email"),
            password: required(positional.next(), "password"),
        },
        Some("logout") => Command::Logout,
        Some("whoami") => Command::Whoami,
        Some("authorize-url") => Command::AuthorizeUrl,
        Some("oauth") => Command::OAuth,
        Some("change-name") => Command::ChangeName {
            name: required(positional.next(), "name"),
        },
        Some("onboarding-done") => Command::OnboardingDone,
        Some(other) => fail(&format!("Unknown command: {other}")),
        None => fail("No command given"),
    };

    CliArgs {
        config_path,
        command,
    }
}

fn required(value: Option<String>, name: &str) -> String {
    value.unwrap_or_else(|| fail(&format!("Missing argument: <{name}>")))
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!("Run with --help for usage information.");
    std::process::exit(2);
}

fn print_usage() {
    println!(
        "\
dealboard-auth {version} -- Dealboard session client

USAGE:
    dealboard-auth [OPTIONS] <COMMAND>

COMMANDS:
    restore                             Restore the stored session and print the outcome
    login <email> <password>            Sign in with email and password
    register <name> <email> <password>  Create an account
    logout                              Sign out and clear local credentials
    whoami                              Print the signed-in user
    authorize-url                       Print an OAuth authorization URL
    oauth                               Authorize, then read the redirect URL from stdin
    change-name <name>                  Change the display name
    onboarding-done                     Mark onboarding as completed

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: dealboard.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    DEALBOARD_CONFIG       Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<ExitCode> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<ExitCode> {
    let cli = parse_args();

    let config_path = std::env::var("DEALBOARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);
    let config = Config::load(&config_path)?;

    init_tracing(&config);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        platform = %config.api.platform,
        "Starting dealboard-auth"
    );

    let client = SessionClient::from_config(&config)?;
    let outcome = client.restore_session().await;

    let ok = match cli.command {
        Command::Restore => {
            match &outcome {
                RestoreOutcome::Restored(user) => println!("restored: {}", user.email),
                RestoreOutcome::NeedsLogin => println!("signed out"),
                RestoreOutcome::TransientFailure(Some(user)) => {
                    println!("offline: keeping cached session for {}", user.email)
                }
                RestoreOutcome::TransientFailure(None) => println!("offline: signed out"),
            }
            outcome.user().is_some()
        }
        Command::Login { email, password } => {
            match client.sign_in_with_email(&email, &password).await {
                Ok(user) => print_json(&user)?,
                Err(errors) => eprintln!("{}", serde_json::to_string_pretty(&errors)?),
            }
            client.state().is_authenticated()
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            match client.sign_up(&name, &email, &password).await {
                Ok(user) => print_json(&user)?,
                Err(errors) => eprintln!("{}", serde_json::to_string_pretty(&errors)?),
            }
            client.state().is_authenticated()
        }
        Command::Logout => {
            client.sign_out().await;
            println!("signed out");
            true
        }
        Command::Whoami => match client.state().user {
            Some(user) => {
                print_json(&user)?;
                true
            }
            None => {
                println!("not signed in");
                false
            }
        },
        Command::AuthorizeUrl => {
            let request = client.begin_oauth()?;
            println!("{}", request.url);
            true
        }
        Command::OAuth => run_oauth(&client).await?,
        Command::ChangeName { name } => report(client.change_name(&name).await),
        Command::OnboardingDone => report(client.complete_onboarding().await),
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_oauth(client: &SessionClient) -> anyhow::Result<bool> {
    let request = client.begin_oauth()?;
    println!("Open this URL and paste the redirect URL here:\n\n{}\n", request.url);

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let response = AuthorizationResponse::from_redirect_url(line.trim(), Some(&request.state));

    Ok(match client.handle_authorization_response(&response).await {
        ExchangeOutcome::SignedIn(user) => {
            print_json(&user)?;
            true
        }
        ExchangeOutcome::Cancelled => {
            println!("cancelled");
            false
        }
        _ => {
            if let Some(error) = client.state().last_error {
                eprintln!("{error}");
            }
            false
        }
    })
}

fn report(result: Result<(), dealboard_auth::auth::ActionError>) -> bool {
    match result {
        Ok(()) => {
            println!("ok");
            true
        }
        Err(dealboard_auth::auth::ActionError::Fields(fields)) => {
            match serde_json::to_string_pretty(&fields) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{fields:?}"),
            }
            false
        }
        Err(e) => {
            eprintln!("{e}");
            false
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("dealboard_auth={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
