// Helper for generating UUIDv7 (timestamp-sortable UUIDs)
//
// Sessions and documents are created app-side with UUIDv7 so that listing
// them by id also lists them by creation time. Users keep PG's
// gen_random_uuid() (v4) default.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Parse a tenant or user id supplied as text (claims, headers, paths).
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}
