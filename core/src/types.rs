//! Domain types for the disposition engine.
//!
//! Identifiers, the entity records owned by the entity store, and the value
//! objects passed across the service boundary.

use crate::error::{DispositionError, Result};
use crate::lifecycle::{RequestStatus, StrayStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw database key.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Raw database key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a `stray_animal` row
    StrayId
);
entity_id!(
    /// Identifier of a `pet_owner` row
    OwnerId
);
entity_id!(
    /// Identifier of a `pet` row
    PetId
);
entity_id!(
    /// Identifier of an `adoption_request` or `redemption_request` row.
    ///
    /// The two tables have independent sequences, so a request is only
    /// addressed together with its [`RequestKind`].
    RequestId
);

/// Hardware tag (implanted chip / RFID number).
///
/// Trimmed, non-empty, at most [`HardwareTag::MAX_LEN`] characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareTag(String);

impl HardwareTag {
    /// Longest accepted tag.
    pub const MAX_LEN: usize = 64;

    /// Validate and normalise a raw tag.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::InvalidArgument`] if the tag is blank or too long.
    pub fn parse(raw: &str) -> Result<Self> {
        let tag = raw.trim();
        if tag.is_empty() {
            return Err(DispositionError::invalid("hardware tag must not be blank"));
        }
        if tag.chars().count() > Self::MAX_LEN {
            return Err(DispositionError::invalid(format!(
                "hardware tag longer than {} characters",
                Self::MAX_LEN
            )));
        }
        Ok(Self(tag.to_string()))
    }

    /// The tag as stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HardwareTag {
    type Error = DispositionError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<HardwareTag> for String {
    fn from(tag: HardwareTag) -> Self {
        tag.0
    }
}

impl fmt::Display for HardwareTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Stray animals, owners, pets
// ============================================================================

/// A captured animal prior to permanent disposition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrayAnimal {
    /// Row id
    pub id: StrayId,
    /// Species (dog, cat, ...)
    pub species: String,
    /// Breed, if known
    pub breed: Option<String>,
    /// Sex, if known
    pub sex: Option<String>,
    /// Colour and distinguishing marks
    pub markings: Option<String>,
    /// Where patrol picked the animal up
    pub capture_location: Option<String>,
    /// Chip number; unique once assigned
    pub hardware_tag: Option<HardwareTag>,
    /// Lifecycle status
    pub status: StrayStatus,
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Last mutation
    pub updated_at: DateTime<Utc>,
}

/// Input for recording a capture.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStray {
    /// Species (required)
    pub species: String,
    /// Breed
    #[serde(default)]
    pub breed: Option<String>,
    /// Sex
    #[serde(default)]
    pub sex: Option<String>,
    /// Markings
    #[serde(default)]
    pub markings: Option<String>,
    /// Capture location
    #[serde(default)]
    pub capture_location: Option<String>,
    /// Chip read at intake
    #[serde(default)]
    pub hardware_tag: Option<HardwareTag>,
}

impl NewStray {
    /// Validate required fields.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::InvalidArgument`] if `species` is blank.
    pub fn validate(mut self) -> Result<Self> {
        self.species = self.species.trim().to_string();
        if self.species.is_empty() {
            return Err(DispositionError::invalid("species is required"));
        }
        Ok(self)
    }
}

/// A person who owns (or wants to own) animals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Row id
    pub id: OwnerId,
    /// Full name
    pub full_name: String,
    /// Phone
    pub phone: Option<String>,
    /// Email
    pub email: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Denormalised number of `pet` rows owned
    pub pet_count: i32,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// Input for registering an owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOwner {
    /// Full name (required)
    pub full_name: String,
    /// Phone
    #[serde(default)]
    pub phone: Option<String>,
    /// Email
    #[serde(default)]
    pub email: Option<String>,
    /// Postal address
    #[serde(default)]
    pub address: Option<String>,
}

impl NewOwner {
    /// Validate required fields.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::InvalidArgument`] if `full_name` is blank.
    pub fn validate(mut self) -> Result<Self> {
        self.full_name = self.full_name.trim().to_string();
        if self.full_name.is_empty() {
            return Err(DispositionError::invalid("full_name is required"));
        }
        Ok(self)
    }
}

/// Status of a permanent ownership record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetStatus {
    /// Living with its owner
    Owned,
    /// Reported missing by its owner
    Missing,
}

impl PetStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Owned => "owned",
            Self::Missing => "missing",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::Internal`] for unknown values; the column
    /// is only written by this crate.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "owned" => Ok(Self::Owned),
            "missing" => Ok(Self::Missing),
            _ => Err(DispositionError::internal(format!("invalid pet status: {s}"))),
        }
    }
}

/// Descriptive fields mirrored from the originating stray record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetDescription {
    /// Species
    pub species: Option<String>,
    /// Breed
    pub breed: Option<String>,
    /// Sex
    pub sex: Option<String>,
    /// Markings
    pub markings: Option<String>,
}

impl PetDescription {
    /// Description carried by a stray record.
    #[must_use]
    pub fn from_stray(stray: &StrayAnimal) -> Self {
        Self {
            species: Some(stray.species.clone()),
            breed: stray.breed.clone(),
            sex: stray.sex.clone(),
            markings: stray.markings.clone(),
        }
    }

    /// Overwrite with `newer`, keeping existing values where `newer` is null.
    #[must_use]
    pub fn coalesce(self, newer: Self) -> Self {
        Self {
            species: newer.species.or(self.species),
            breed: newer.breed.or(self.breed),
            sex: newer.sex.or(self.sex),
            markings: newer.markings.or(self.markings),
        }
    }
}

/// Permanent ownership record keyed by hardware tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    /// Row id
    pub id: PetId,
    /// Current owner
    pub owner_id: OwnerId,
    /// Chip number; the join key once assigned
    pub hardware_tag: Option<HardwareTag>,
    /// Mirrored description
    #[serde(flatten)]
    pub description: PetDescription,
    /// Ownership status
    pub status: PetStatus,
    /// Times this animal was captured with a hand-entered tag
    pub capture_count: i32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting a pet row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPet {
    /// Owner
    pub owner_id: OwnerId,
    /// Chip number
    pub hardware_tag: Option<HardwareTag>,
    /// Description
    pub description: PetDescription,
    /// Ownership status
    pub status: PetStatus,
}

// ============================================================================
// Requests
// ============================================================================

/// The two disposition workflows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// An adopter applies for an animal listed for adoption
    Adoption,
    /// An owner asks for the return of their animal
    Redemption,
}

impl RequestKind {
    /// Path/string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Adoption => "adoption",
            Self::Redemption => "redemption",
        }
    }

    /// Human name used in error messages.
    #[must_use]
    pub const fn entity_name(&self) -> &'static str {
        match self {
            Self::Adoption => "adoption request",
            Self::Redemption => "redemption request",
        }
    }

    /// Parse a kind.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::InvalidArgument`] for unknown kinds.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "adoption" => Ok(Self::Adoption),
            "redemption" => Ok(Self::Redemption),
            _ => Err(DispositionError::invalid(format!("unknown request kind: {s}"))),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof-of-ownership images, as opaque storage paths or URLs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Attachments {
    /// Nothing attached
    #[default]
    None,
    /// A single path
    Path(String),
    /// Several paths
    List(Vec<String>),
}

impl Attachments {
    /// Longest accepted path.
    pub const MAX_PATH_LEN: usize = 512;
    /// Most paths accepted on one request.
    pub const MAX_ITEMS: usize = 10;

    /// Validate and normalise: blank input becomes `None`, single-element
    /// lists become `Path`.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::InvalidArgument`] for blank or oversized
    /// paths and for too many entries.
    pub fn validate(self) -> Result<Self> {
        let paths = match self {
            Self::None => return Ok(Self::None),
            Self::Path(path) => vec![path],
            Self::List(paths) => paths,
        };
        if paths.len() > Self::MAX_ITEMS {
            return Err(DispositionError::invalid(format!(
                "at most {} attachments are accepted",
                Self::MAX_ITEMS
            )));
        }
        let mut cleaned = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.trim();
            if path.is_empty() {
                return Err(DispositionError::invalid("attachment path must not be blank"));
            }
            if path.len() > Self::MAX_PATH_LEN {
                return Err(DispositionError::invalid(format!(
                    "attachment path longer than {} bytes",
                    Self::MAX_PATH_LEN
                )));
            }
            cleaned.push(path.to_string());
        }
        Ok(match cleaned.len() {
            0 => Self::None,
            1 => Self::Path(cleaned.remove(0)),
            _ => Self::List(cleaned),
        })
    }
}

/// Structured adoption application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApplicantDetails {
    /// Occupation
    pub occupation: Option<String>,
    /// Housing situation (house with yard, apartment, ...)
    pub housing: Option<String>,
    /// Whether other animals live in the household
    pub has_other_pets: Option<bool>,
    /// Free-form notes
    pub notes: Option<String>,
}

/// Workflow-specific request payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestDetails {
    /// Adoption application
    Adoption {
        /// Applicant questionnaire
        #[serde(default)]
        applicant: ApplicantDetails,
    },
    /// Redemption claim
    Redemption {
        /// Proof-of-ownership images
        #[serde(default)]
        proof: Attachments,
        /// Phone number overriding the owner's profile for this request
        #[serde(default)]
        contact_phone: Option<String>,
    },
}

impl RequestDetails {
    /// Empty payload for a kind.
    #[must_use]
    pub fn empty(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Adoption => Self::Adoption {
                applicant: ApplicantDetails::default(),
            },
            RequestKind::Redemption => Self::Redemption {
                proof: Attachments::None,
                contact_phone: None,
            },
        }
    }

    /// Which workflow this payload belongs to.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::Adoption { .. } => RequestKind::Adoption,
            Self::Redemption { .. } => RequestKind::Redemption,
        }
    }

    /// Validate the payload at the boundary.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::InvalidArgument`] for invalid attachments.
    pub fn validate(self) -> Result<Self> {
        match self {
            Self::Adoption { applicant } => Ok(Self::Adoption { applicant }),
            Self::Redemption {
                proof,
                contact_phone,
            } => Ok(Self::Redemption {
                proof: proof.validate()?,
                contact_phone: contact_phone
                    .map(|phone| phone.trim().to_string())
                    .filter(|phone| !phone.is_empty()),
            }),
        }
    }
}

/// An adoption or redemption request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionRequest {
    /// Row id (unique per kind)
    pub id: RequestId,
    /// Target animal
    pub stray_id: StrayId,
    /// Adopter or owner
    pub requester_id: OwnerId,
    /// Review status
    pub status: RequestStatus,
    /// Workflow payload; also carries the kind
    pub details: RequestDetails,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl DispositionRequest {
    /// Which workflow this request belongs to.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.details.kind()
    }
}

/// Input for submitting a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRequest {
    /// Target animal
    pub stray_id: StrayId,
    /// Adopter or owner
    pub requester_id: OwnerId,
    /// Workflow payload
    pub details: RequestDetails,
}

/// Filters for listing requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestFilter {
    /// Which table
    pub kind: RequestKind,
    /// Only requests by this adopter/owner
    pub requester_id: Option<OwnerId>,
    /// Only requests in this status
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    /// All requests of a kind.
    #[must_use]
    pub const fn all(kind: RequestKind) -> Self {
        Self {
            kind,
            requester_id: None,
            status: None,
        }
    }
}

/// A request joined with display data from the stray and the requester.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestListing {
    /// The request itself
    #[serde(flatten)]
    pub request: DispositionRequest,
    /// Stray species
    pub stray_species: String,
    /// Stray status at read time
    pub stray_status: StrayStatus,
    /// Stray chip number
    pub stray_tag: Option<HardwareTag>,
    /// Requester name
    pub requester_name: String,
    /// Requester phone
    pub requester_phone: Option<String>,
}

// ============================================================================
// Claim inputs and outputs
// ============================================================================

/// Parameters of a claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimCommand {
    /// Request table
    pub kind: RequestKind,
    /// Approved request to materialise
    pub request_id: RequestId,
    /// Tag entered by staff; falls back to the stray's tag
    pub hardware_tag: Option<HardwareTag>,
    /// Tag was typed in by hand rather than read by a scanner
    pub manual_entry: bool,
}

/// Result of a successful claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// The single pet row for the tag
    pub pet_id: PetId,
    /// The tag
    pub hardware_tag: HardwareTag,
    /// The new owner
    pub owner_id: OwnerId,
    /// Previous holder, when a row was transferred
    pub transferred_from: Option<OwnerId>,
    /// Duplicate rows deleted
    pub removed_duplicates: usize,
    /// Other open requests for the stray rejected by the claim
    pub closed_requests: u64,
    /// `pet_count` adjustments that failed and await a recompute
    pub failed_counter_updates: usize,
}

/// An owner whose counter disagreed with the actual number of pet rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetCountCorrection {
    /// Owner
    pub owner_id: OwnerId,
    /// Stored counter before the recompute
    pub previous: i32,
    /// Number of pet rows actually owned
    pub actual: i32,
}
