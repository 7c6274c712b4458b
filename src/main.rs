use std::path::PathBuf;

use tally::db;

#[rocket::launch]
fn rocket() -> _ {
    let figment = rocket::Config::figment();
    let db_path: PathBuf = figment
        .extract_inner("db_path")
        .unwrap_or_else(|_| PathBuf::from("data/tally.sqlite"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).expect("create data directory");
    }
    let pool = db::init_db(&db_path);
    tally::rocket(pool)
}
