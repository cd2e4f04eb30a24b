use clap::{Parser, Subcommand};
use serde::Serialize;
use warden_core::auth::NewGrantable;
use warden_core::logging::init_logging;
use warden_core::{App, Config};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Authentication, token revocation and RBAC server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the database and start the HTTP server
    Serve,
    /// Run pending migrations
    Migrate,
    /// Delete revocation records whose tokens have expired
    PurgeRevoked,
    /// Role operations
    Role {
        #[command(subcommand)]
        action: GrantableCommands,
    },
    /// Permission operations
    Permission {
        #[command(subcommand)]
        action: GrantableCommands,
    },
    /// Give a role a permission
    Grant { role_id: i32, permission_id: i32 },
    /// Give a user a role
    Assign { user_id: i32, role_id: i32 },
    /// Require a permission for an endpoint (e.g. "GET /api/v1/users")
    Map {
        endpoint_name: String,
        permission_id: i32,
    },
}

#[derive(Subcommand)]
enum GrantableCommands {
    /// Create a new entry
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Serve => {
            let app = App::new().await?;
            app.run().await?;
        }
        Commands::Migrate => {
            let config = Config::from_env()?;
            let db = warden_core::db::connect(&config).await?;
            warden_core::db::migrate(&db).await?;
            println!("Migrations applied.");
        }
        Commands::PurgeRevoked => {
            let app = App::new().await?;
            let removed = app.state.tokens.purge_expired().await?;
            println!("Removed {} expired revocation record(s).", removed);
        }
        Commands::Role { action } => {
            let app = App::new().await?;
            let GrantableCommands::Create { name, description } = action;
            let role = app
                .state
                .rbac
                .create_role(NewGrantable { name, description })
                .await?;
            print_json(&role)?;
        }
        Commands::Permission { action } => {
            let app = App::new().await?;
            let GrantableCommands::Create { name, description } = action;
            let permission = app
                .state
                .rbac
                .create_permission(NewGrantable { name, description })
                .await?;
            print_json(&permission)?;
        }
        Commands::Grant {
            role_id,
            permission_id,
        } => {
            let app = App::new().await?;
            let link = app.state.rbac.assign_permission(role_id, permission_id).await?;
            print_json(&link)?;
        }
        Commands::Assign { user_id, role_id } => {
            let app = App::new().await?;
            let link = app.state.rbac.assign_role(user_id, role_id).await?;
            print_json(&link)?;
        }
        Commands::Map {
            endpoint_name,
            permission_id,
        } => {
            let app = App::new().await?;
            let mapping = app
                .state
                .rbac
                .map_endpoint(&endpoint_name, permission_id)
                .await?;
            print_json(&mapping)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
