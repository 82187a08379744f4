//! Server-name command - prints the database server name.

use crate::config::Config;
use crate::errors::AppResult;
use crate::infra::SqlHelper;
use crate::services::{register_services, DiagnosticsService};

/// Execute the server-name command
pub async fn execute(config: Config) -> AppResult<()> {
    let provider = register_services(config.app, SqlHelper::postgres()).build();
    let diagnostics = provider.create_scope().resolve::<dyn DiagnosticsService>()?;

    println!("{}", diagnostics.server_name().await?);
    Ok(())
}
