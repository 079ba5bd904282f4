use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use club_api::auth::{
    AuthConfig, AuthError, IdentityClaims, PasswordService, PgUserStore, TokenService, UserStore,
};
use club_api::db::run_migrations;
use club_api::models::{ADMIN_ROLE, DEFAULT_ROLE, NewUser, normalize_email};

#[derive(Parser, Debug)]
#[command(name = "create_user", about = "Provision a club account")]
struct Args {
    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    /// Optional display name.
    #[arg(long)]
    name: Option<String>,

    /// Role to assign (`user` or `admin`). Admins also get the admin flag.
    #[arg(long, default_value = DEFAULT_ROLE)]
    role: String,

    /// Print an access/refresh token pair for the new user. Needs CLUB_JWT_SECRET.
    #[arg(long)]
    issue_token: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let email = normalize_email(&args.email);

    if !email.contains('@') {
        writeln!(io::stderr(), "error: email must contain '@'")?;
        return Ok(ExitCode::FAILURE);
    }

    let role = match args.role.trim().to_lowercase().as_str() {
        "admin" => ADMIN_ROLE,
        "user" => DEFAULT_ROLE,
        other => {
            writeln!(
                io::stderr(),
                "error: unsupported role '{other}'. Use 'user' or 'admin'."
            )?;
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Err(err) = PasswordService::validate_new_password(&args.password) {
        writeln!(io::stderr(), "error: {err}")?;
        return Ok(ExitCode::FAILURE);
    }

    // Fail on token config before touching the database.
    let token_service = if args.issue_token {
        let config = AuthConfig::from_env()?;
        Some(TokenService::from_config(&config)?)
    } else {
        None
    };

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;

    let password_hash = PasswordService::new()?.hash_password(&args.password)?;
    let store = PgUserStore::new(pool);
    let new_user = NewUser {
        email: email.clone(),
        name: args.name.map(|name| name.trim().to_string()).filter(|name| !name.is_empty()),
        role: role.to_string(),
        is_admin: role == ADMIN_ROLE,
        password_hash,
    };

    let user = match store.insert(new_user).await {
        Ok(user) => user,
        Err(AuthError::EmailTaken) => {
            writeln!(io::stderr(), "error: a user with email '{email}' already exists.")?;
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    };

    println!("Created {role} user '{}' with id {}", user.email, user.id);

    if let Some(token_service) = token_service {
        let pair = token_service.issue_token_pair(&IdentityClaims::from(&user))?;
        println!("{}", serde_json::to_string_pretty(&pair)?);
    }

    Ok(ExitCode::SUCCESS)
}
