//! ID generation helpers.
//!
//! Entity primary keys use UUIDv7 so that IDs sort chronologically,
//! matching the teacher's `Id<T, V7>` default for database keys.

use uuid::Uuid;

/// Generate a new time-ordered ID for a database row.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}
