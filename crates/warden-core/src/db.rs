use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::config::Config;
use crate::migrations::Migrator;

/// Initialize the database connection from config.
pub async fn connect(config: &Config) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut opts = ConnectOptions::new(&config.database_url);

    if config.database_url.contains(":memory:") {
        // every pooled connection would otherwise get its own empty database
        opts.max_connections(1).min_connections(1);
    } else {
        opts.max_connections(20).min_connections(1);
    }

    opts.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(config.is_dev());

    SeaDatabase::connect(opts).await
}

/// Apply pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    Migrator::up(db, None).await?;
    tracing::info!("database migrations applied");
    Ok(())
}
