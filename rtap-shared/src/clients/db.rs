use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Build the connection pool without touching the store.
///
/// The pool is lazy: a database that is down at startup surfaces as checkout
/// errors on the first request or cycle that needs it, and service resumes
/// once the store is reachable again.
pub fn create_pool(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(10)
        .test_on_check_out(true)
        .build_unchecked(manager);

    tracing::info!("database connection pool created");
    pool
}
