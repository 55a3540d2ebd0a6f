//! Guarded app management commands for CLI.

use clap::Subcommand;
use stillpoint_core::{GuardedApp, Store};

use super::open_database;

#[derive(Subcommand)]
pub enum AppsAction {
    /// List guarded apps
    List {
        /// Only apps currently being guarded
        #[arg(long)]
        active: bool,
    },
    /// Guard an app
    Add {
        /// Platform identifier (e.g. "com.instagram.android")
        identifier: String,
        /// Display name shown on the overlay
        name: String,
    },
    /// Stop guarding an app and forget it
    Remove {
        identifier: String,
    },
    /// Resume guarding a known app
    Enable {
        identifier: String,
    },
    /// Keep an app in the list but stop guarding it
    Disable {
        identifier: String,
    },
}

pub fn run(action: AppsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database()?;

    match action {
        AppsAction::List { active } => {
            let apps = if active {
                db.active_guarded_apps()?
            } else {
                db.all_guarded_apps()?
            };
            println!("{}", serde_json::to_string_pretty(&apps)?);
        }
        AppsAction::Add { identifier, name } => {
            let app = match db.guarded_app(&identifier)? {
                Some(existing) => GuardedApp {
                    display_name: name,
                    is_active: true,
                    ..existing
                },
                None => GuardedApp::new(identifier, name),
            };
            db.upsert_guarded_app(&app)?;
            println!("{}", serde_json::to_string_pretty(&app)?);
        }
        AppsAction::Remove { identifier } => {
            if !db.remove_guarded_app(&identifier)? {
                return Err(format!("not guarded: {identifier}").into());
            }
            println!("removed {identifier}");
        }
        AppsAction::Enable { identifier } => set_active(&db, &identifier, true)?,
        AppsAction::Disable { identifier } => set_active(&db, &identifier, false)?,
    }
    Ok(())
}

fn set_active(
    db: &stillpoint_core::Database,
    identifier: &str,
    active: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = db
        .guarded_app(identifier)?
        .ok_or_else(|| format!("unknown app: {identifier}"))?;
    let app = GuardedApp { is_active: active, ..app };
    db.upsert_guarded_app(&app)?;
    println!("{}", serde_json::to_string_pretty(&app)?);
    Ok(())
}
