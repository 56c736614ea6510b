//! Lifecycle rules shared by requirements and relations.
//!
//! Each identity moves `NONE -> ACTIVE -> ACTIVE* -> DELETED`. A tombstoned
//! identity is terminal: it can be read and its history listed, but never
//! updated again. Recreating it means creating a new identity.

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::error::{EntityKind, PegsError, Result};
use crate::store::StoredVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityState {
    Active,
    Deleted,
}

fn state_of(latest: Option<&StoredVersion>) -> Option<EntityState> {
    latest.map(|v| {
        if v.deleted {
            EntityState::Deleted
        } else {
            EntityState::Active
        }
    })
}

/// Checks that `latest` may receive another version and returns the number
/// that version gets.
pub fn next_version(
    entity: EntityKind,
    id: Uuid,
    latest: Option<&StoredVersion>,
    expected: Option<u32>,
) -> Result<u32> {
    let latest = match (state_of(latest), latest) {
        (Some(EntityState::Active), Some(latest)) => latest,
        (Some(EntityState::Deleted), _) => return Err(PegsError::Deleted { entity, id }),
        _ => return Err(PegsError::NotFound { entity, id }),
    };

    match expected {
        Some(expected) if expected != latest.version => Err(PegsError::ConcurrentModification {
            entity,
            id,
            expected,
            actual: latest.version,
        }),
        _ => Ok(latest.version + 1),
    }
}

/// Current instant at the precision versions are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Timestamp for a new version: now, unless that would precede the previous
/// version of the same identity.
pub fn effective_from(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(previous) if previous > now => previous,
        _ => now,
    }
}
