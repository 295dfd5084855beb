use crate::model::{DAY_MS, Ms};

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 256;

/// Hotels and rooms together.
pub const MAX_RESOURCES_PER_TENANT: usize = 100_000;
pub const MAX_INTERVALS_PER_RESOURCE: usize = 100_000;
pub const MAX_USERS_PER_TENANT: usize = 1_000_000;

pub const MAX_NAME_LEN: usize = 512;
pub const MAX_TEXT_LEN: usize = 4096;
pub const MAX_BATCH_SIZE: usize = 1000;

pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;
pub const MAX_STAY_MS: Ms = 365 * DAY_MS;

pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Hold length when a reservation is inserted without `expires_at`.
pub const DEFAULT_RESERVATION_TTL_MS: Ms = 15 * 60 * 1000;
