use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::favorites::{Favorite, FavoritesStore, InitState};
use crate::platform::{DebugInfo, Platform};

/// Local favorites store for MealMates recipes
///
/// Runs one command per invocation and prints the result as JSON.
#[derive(Parser, Debug)]
#[command(name = "mealmates")]
#[command(version, about = "MealMates local favorites store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Mark a recipe as favorite
    Add { recipe_id: String, user_id: String },
    /// Unmark a recipe
    Remove { recipe_id: String, user_id: String },
    /// Flip a recipe's favorite state and print the new one
    Toggle { recipe_id: String, user_id: String },
    /// Whether a recipe is a favorite
    Check { recipe_id: String, user_id: String },
    /// Recipe ids, most recently added first
    List { user_id: String },
    Count { user_id: String },
    /// Favorites with ids and timestamps
    Details { user_id: String },
    /// Drop every favorite of a user
    Clear { user_id: String },
    /// Backend state and host diagnostics
    Status,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutput {
    Updated {
        recipe_id: String,
        user_id: String,
        favorite: bool,
    },
    Favorites {
        user_id: String,
        recipe_ids: Vec<String>,
    },
    Count {
        user_id: String,
        count: usize,
    },
    Details {
        user_id: String,
        favorites: Vec<Favorite>,
    },
    Cleared {
        user_id: String,
    },
    Status {
        state: InitState,
        available: bool,
        platform: Platform,
        pending_operations: usize,
        debug: DebugInfo,
    },
}

pub async fn execute(store: &FavoritesStore, command: Command) -> CommandOutput {
    match command {
        Command::Add { recipe_id, user_id } => {
            store.add_favorite(&recipe_id, &user_id).await;
            CommandOutput::Updated {
                recipe_id,
                user_id,
                favorite: true,
            }
        }
        Command::Remove { recipe_id, user_id } => {
            store.remove_favorite(&recipe_id, &user_id).await;
            CommandOutput::Updated {
                recipe_id,
                user_id,
                favorite: false,
            }
        }
        Command::Toggle { recipe_id, user_id } => {
            let favorite = store.toggle_favorite(&recipe_id, &user_id).await;
            CommandOutput::Updated {
                recipe_id,
                user_id,
                favorite,
            }
        }
        Command::Check { recipe_id, user_id } => {
            let favorite = store.is_favorite(&recipe_id, &user_id).await;
            CommandOutput::Updated {
                recipe_id,
                user_id,
                favorite,
            }
        }
        Command::List { user_id } => {
            let recipe_ids = store.get_favorites(&user_id).await;
            CommandOutput::Favorites {
                user_id,
                recipe_ids,
            }
        }
        Command::Count { user_id } => {
            let count = store.get_favorite_count(&user_id).await;
            CommandOutput::Count { user_id, count }
        }
        Command::Details { user_id } => {
            let favorites = store.get_favorite_details(&user_id).await;
            CommandOutput::Details { user_id, favorites }
        }
        Command::Clear { user_id } => {
            store.clear_user_favorites(&user_id).await;
            CommandOutput::Cleared { user_id }
        }
        Command::Status => CommandOutput::Status {
            state: store.init_state(),
            available: store.is_available(),
            platform: store.platform(),
            pending_operations: store.pending_operations(),
            debug: store.debug_info(),
        },
    }
}
