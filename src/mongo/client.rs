use mongodb::{bson::doc, options::ClientOptions, Client};
use tracing::info;

use crate::app::config::MongoConfig;
use crate::error::{Error, Result};

pub const SCHEME: &str = "mongodb";
pub const APP_NAME: &str = "flight-analytics";

/// Build a connection URI.
///
/// The credential segment and `authSource` parameter are only emitted when
/// both username and password are non-empty. Nothing is escaped or
/// validated; a bad host or port only shows up when connecting.
pub fn build_uri(
    username: &str,
    password: &str,
    host: &str,
    port: u16,
    db_name: &str,
    auth_source: &str,
) -> String {
    if !username.is_empty() && !password.is_empty() {
        format!(
            "{}://{}:{}@{}:{}/{}?authSource={}",
            SCHEME, username, password, host, port, db_name, auth_source
        )
    } else {
        format!("{}://{}:{}/{}", SCHEME, host, port, db_name)
    }
}

/// URI for the configured server.
pub fn uri_for(config: &MongoConfig) -> Result<String> {
    let credentials = config.credentials()?;
    let (username, password) = credentials
        .as_ref()
        .map(|c| (c.username(), c.password()))
        .unwrap_or(("", ""));

    Ok(build_uri(
        username,
        password,
        &config.host,
        config.port,
        &config.database,
        &config.admin_db,
    ))
}

pub async fn connect(uri: &str) -> Result<Client> {
    let mut options = ClientOptions::parse(uri).await.map_err(Error::Connection)?;

    options.app_name = Some(APP_NAME.into());

    let client = Client::with_options(options).map_err(Error::Connection)?;

    // Fail before the first query if the server is down or rejects us
    client
        .database("admin")
        .run_command(doc! {"ping": 1}, None)
        .await
        .map_err(Error::Connection)?;

    Ok(client)
}

/// Connect using the `[mongo]` configuration section.
pub async fn connect_configured(config: &MongoConfig) -> Result<Client> {
    let uri = uri_for(config)?;
    info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        authenticated = config.has_credentials(),
        "connecting to MongoDB"
    );
    connect(&uri).await
}
