//! # Core Type Definitions
//!
//! This module contains the fundamental types used throughout the proximity
//! service. These types provide the building blocks for user identification,
//! geographic positioning, and presence lifecycle management.
//!
//! ## Key Types
//!
//! - [`UserId`] - Unique identifier for registered users
//! - [`WatchId`] - Unique identifier for subscription watches
//! - [`GeoPosition`] - Latitude/longitude pair with range validation
//! - [`ProfileSnapshot`] - Immutable per-session profile data
//! - [`PresenceEntry`] - A user's live presence record
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent ID confusion (UserId vs WatchId)
//! - **Precision**: Double-precision coordinates for sub-meter accuracy
//! - **Serialization**: All types support JSON serialization for the wire

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a registered user.
///
/// This is a wrapper around UUID that provides type safety and ensures
/// user IDs cannot be confused with other kinds of IDs in the system.
///
/// # Examples
///
/// ```rust
/// use proximity_core::UserId;
///
/// let user_id = UserId::new();
/// println!("User ID: {}", user_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Creates a new random user ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a user ID from a string representation.
    ///
    /// Returns `Ok(UserId)` if the string is a valid UUID, otherwise
    /// `Err(uuid::Error)` with details about the parsing failure.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a watch registration.
///
/// Watches are the only per-client mutable state the service keeps, so their
/// identifiers are handed back to clients for explicit release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchId(pub Uuid);

impl WatchId {
    /// Creates a new random watch ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Geography
// ============================================================================

/// A geographic position in degrees.
///
/// Latitude is constrained to `[-90, 90]`, longitude to `[-180, 180]`.
/// Construction does not validate; call [`GeoPosition::validate`] at the
/// ingestion boundary before trusting client-supplied coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    /// Latitude in degrees (south negative, north positive)
    pub latitude: f64,
    /// Longitude in degrees (west negative, east positive)
    pub longitude: f64,
}

impl GeoPosition {
    /// Creates a new position with the specified coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Checks that both coordinates are finite and within range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to another position, in meters.
    pub fn distance_to(&self, other: &GeoPosition) -> f64 {
        crate::geo::haversine_distance_m(self, other)
    }
}

/// The current reported position of a user.
///
/// Exactly one `UserPosition` exists per live user; a newer report supersedes
/// the previous one, older reports are dropped as stale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserPosition {
    /// Reported coordinates
    pub position: GeoPosition,
    /// Client-supplied report timestamp in milliseconds, used to order
    /// reports per user
    pub timestamp_ms: u64,
    /// Optional reported accuracy radius in meters
    pub accuracy_m: Option<f64>,
}

// ============================================================================
// Profiles and presence
// ============================================================================

/// Gender category shown to nearby users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenderCategory {
    Male,
    Female,
    NonBinary,
    Unspecified,
}

impl std::fmt::Display for GenderCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            GenderCategory::Male => "male",
            GenderCategory::Female => "female",
            GenderCategory::NonBinary => "non-binary",
            GenderCategory::Unspecified => "unspecified",
        };
        write!(f, "{}", label)
    }
}

/// Minimum accepted profile age.
pub const MIN_AGE: u8 = 18;
/// Maximum accepted profile age.
pub const MAX_AGE: u8 = 120;

/// Immutable profile data shown to nearby users.
///
/// Supplied once at registration and owned by the presence registry. The
/// spatial index never stores profile data; it is joined in at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// The owning user's ID
    pub user_id: UserId,
    /// Display name shown on the map
    pub display_name: String,
    /// Age in years, within `[18, 120]`
    pub age: u8,
    /// Gender category for marker styling
    pub gender: GenderCategory,
}

/// Lifecycle state of a presence entry.
///
/// `Pending` entries have registered but not yet reported a position and are
/// invisible to queries. `Active` entries reported within the TTL. `Expired`
/// entries are out of the spatial index but linger in the registry until the
/// grace period elapses, bounding memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Pending,
    Active,
    Expired,
}

/// A user's live presence record: profile, current position and liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Immutable profile snapshot supplied at registration
    pub profile: ProfileSnapshot,
    /// Most recent accepted position report, if any
    pub position: Option<UserPosition>,
    /// Server-clock time of the last accepted report (or registration),
    /// in milliseconds; drives TTL expiry
    pub last_seen_ms: u64,
    /// Current lifecycle state
    pub state: PresenceState,
}

impl PresenceEntry {
    /// Whether this entry should be visible to queries.
    pub fn is_active(&self) -> bool {
        self.state == PresenceState::Active
    }
}

/// A single query result: who, and how far away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyUser {
    /// The matched user's profile
    pub profile: ProfileSnapshot,
    /// Exact distance from the requester in meters
    pub distance_m: f64,
}
