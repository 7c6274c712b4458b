pub mod analytics;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod time;

use rocket::{Build, Rocket};

use db::DbPool;

/// Assembles the API server around an already-initialized pool, so tests
/// can point it at a throwaway database.
pub fn rocket(pool: DbPool) -> Rocket<Build> {
    rocket::build()
        .manage(pool)
        .mount("/api", routes::api_routes())
        .register("/api", routes::api_catchers())
}
