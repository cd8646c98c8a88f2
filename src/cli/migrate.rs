use error_stack::{Report, Result, ResultExt};
use thiserror::Error;

use whisperline::database;

#[derive(Debug, Error)]
#[error("Failed to migrate the database")]
pub struct MigrateError;

pub fn run() -> Result<(), MigrateError> {
    let (config, runtime) = super::setup(Some(1)).change_context(MigrateError)?;
    let Some(db) = config.db else {
        return Err(Report::new(MigrateError)
            .attach_printable("no database configured, set `DATABASE_URL` or `db.url`"));
    };

    runtime.block_on(async move {
        let pool = database::Pool::new(&db).await.change_context(MigrateError)?;
        pool.run_migrations().await.change_context(MigrateError)?;
        println!("database is up to date");
        Ok(())
    })
}
