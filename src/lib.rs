#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;

use crate::auth::{AuthConfig, AuthState, PgUserStore, UserStore};
use crate::db::ClubDb;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Every route served under `/api`, plus the generated `openapi.json`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        routes::health::health_check,
        auth::routes::signup,
        auth::routes::login,
        auth::routes::refresh,
        auth::routes::me,
        auth::routes::session,
        auth::routes::signing_keys,
    ]
}

/// JSON catchers for auth rejections and generic client errors.
pub fn api_catchers() -> Vec<rocket::Catcher> {
    let mut catchers = auth::catchers::catchers();
    catchers.extend(error::catchers());
    catchers
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors();

    let rocket = rocket::build()
        .attach(RequestLogger)
        .attach(ClubDb::init());

    let rocket = match cors {
        Ok(cors) => rocket.attach(cors),
        Err(err) => {
            log::error!("invalid CORS configuration, serving without CORS: {}", err);
            rocket
        }
    };

    rocket
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            let Some(db) = ClubDb::fetch(&rocket) else {
                log::error!("database pool not available for migrations");
                return Err(rocket);
            };
            let pool = (**db).clone();
            match db::run_migrations(&pool).await {
                Ok(()) => Ok(rocket),
                Err(e) => {
                    log::error!("database migrations failed: {}", e);
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::error!("refusing to start: {}", err);
                    return Err(rocket);
                }
            };
            let Some(db) = ClubDb::fetch(&rocket) else {
                log::error!("database pool not available for the user store");
                return Err(rocket);
            };
            let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new((**db).clone()));

            match AuthState::new(config, users) {
                Ok(state) => {
                    log::info!(
                        "auth ready (issuer {}, legacy tokens {})",
                        state.config.issuer,
                        if state.config.accept_legacy_tokens { "accepted" } else { "rejected" }
                    );
                    Ok(rocket.manage(state))
                }
                Err(err) => {
                    log::error!("failed to initialise auth: {}", err);
                    Err(rocket)
                }
            }
        }))
        .register("/", api_catchers())
        .mount("/api", api_routes())
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Club API", "../../openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};

    use crate::auth::{AuthConfig, AuthState, MemoryUserStore, UserStore};

    pub use database::{TestDatabase, TestDatabaseError};

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use thiserror::Error;
        use uuid::Uuid;

        use crate::db::run_migrations;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
        }

        /// Throwaway database created next to the one `TEST_DATABASE_URL` points at.
        pub struct TestDatabase {
            pool: PgPool,
            admin_options: PgConnectOptions,
            database_name: String,
        }

        impl TestDatabase {
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                let url =
                    std::env::var("TEST_DATABASE_URL").map_err(|_| TestDatabaseError::MissingUrl)?;
                let base_options: PgConnectOptions = url.parse()?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await?;

                let database_name = format!("club_test_{}", Uuid::new_v4().simple());
                sqlx::query(&format!("CREATE DATABASE \"{database_name}\""))
                    .execute(&admin_pool)
                    .await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.database(&database_name))
                    .await?;
                run_migrations(&pool).await?;

                Ok(Self {
                    pool,
                    admin_options,
                    database_name,
                })
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool.clone()
            }

            /// Close the pool and drop the database.
            pub async fn close(self) -> Result<(), TestDatabaseError> {
                self.pool.close().await;
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(self.admin_options)
                    .await?;
                sqlx::query(&format!(
                    "DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)",
                    self.database_name
                ))
                .execute(&admin_pool)
                .await?;
                Ok(())
            }
        }
    }

    pub const TEST_ACCESS_SECRET: &str = "test-access-secret-0123456789abcdef";
    pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret-0123456789abcdef";

    /// Config with fixed secrets and defaults for everything else.
    pub fn test_auth_config() -> AuthConfig {
        test_auth_config_with(|_| None)
    }

    /// Like [`test_auth_config`], with `overrides` consulted before the fixed secrets.
    pub fn test_auth_config_with<F>(overrides: F) -> AuthConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        AuthConfig::from_lookup(|key| {
            overrides(key).or_else(|| match key {
                "CLUB_JWT_SECRET" => Some(TEST_ACCESS_SECRET.to_string()),
                "CLUB_JWT_REFRESH_SECRET" => Some(TEST_REFRESH_SECRET.to_string()),
                _ => None,
            })
        })
        .expect("test auth config is valid")
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        auth_state: Option<AuthState>,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                auth_state: None,
            }
        }

        /// Mount routes under `/api`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api".to_string(), routes));
            self
        }

        pub fn with_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Manage an [`AuthState`] over `users` using [`test_auth_config`].
        pub fn with_users(self, users: Arc<MemoryUserStore>) -> Self {
            let users: Arc<dyn UserStore> = users;
            let state = AuthState::new(test_auth_config(), users).expect("auth state");
            self.with_auth_state(state)
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).register("/", crate::api_catchers());

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
