// Repository layer — each domain lives in its own file with `impl PortalRepository`.
//
// This is the realtime core's view of the relational schema: a room
// membership store, a message store, and a user directory. The portal's
// full CRUD surface lives outside this crate.

use sqlx::sqlite::SqlitePool;

mod messages;
mod rooms;
mod users;

pub use messages::HistoryMessage;

#[cfg(test)]
pub(crate) mod test_helpers;

#[derive(Clone)]
pub struct PortalRepository {
    pub(crate) pool: SqlitePool,
}

impl PortalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}
