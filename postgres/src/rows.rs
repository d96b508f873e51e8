//! Row decoding and SQL fragments shared by the store queries.

use animal_control_core::error::{DispositionError, Result};
use animal_control_core::lifecycle::{RequestStatus, StrayStatus};
use animal_control_core::types::{
    ApplicantDetails, Attachments, DispositionRequest, HardwareTag, Owner, OwnerId, Pet,
    PetDescription, PetId, PetStatus, RequestDetails, RequestId, RequestKind, RequestListing,
    StrayAnimal, StrayId,
};
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Json;

pub(crate) const STRAY_COLUMNS: &str = "id, species, breed, sex, markings, capture_location, \
     hardware_tag, status, captured_at, updated_at";

pub(crate) const OWNER_COLUMNS: &str =
    "id, full_name, phone, email, address, pet_count, created_at";

pub(crate) const PET_COLUMNS: &str = "id, owner_id, hardware_tag, species, breed, sex, markings, \
     status, capture_count, created_at, updated_at";

/// Table holding requests of `kind`.
pub(crate) const fn request_table(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Adoption => "adoption_request",
        RequestKind::Redemption => "redemption_request",
    }
}

/// Request columns, qualified with the alias `r`.
pub(crate) const fn request_columns(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Adoption => {
            "r.id, r.stray_id, r.requester_id, r.status, r.applicant, r.created_at, r.updated_at"
        }
        RequestKind::Redemption => {
            "r.id, r.stray_id, r.requester_id, r.status, r.proof, r.contact_phone, \
             r.created_at, r.updated_at"
        }
    }
}

/// Map a driver error to `Internal`, keeping the cause for logs.
pub(crate) fn storage(context: &'static str) -> impl Fn(sqlx::Error) -> DispositionError {
    move |e| DispositionError::internal(format!("{context}: {e}"))
}

/// Like [`storage`], but unique violations on the stray tag become `Conflict`.
pub(crate) fn tag_write<'a>(
    context: &'static str,
    tag: &'a HardwareTag,
) -> impl Fn(sqlx::Error) -> DispositionError + 'a {
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return DispositionError::conflict(format!(
                    "hardware tag {tag} already belongs to another stray"
                ));
            }
        }
        DispositionError::internal(format!("{context}: {e}"))
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| DispositionError::internal(format!("decode column {name}: {e}")))
}

fn tag_column(row: &PgRow, name: &str) -> Result<Option<HardwareTag>> {
    column::<Option<String>>(row, name)?
        .map(|raw| {
            HardwareTag::parse(&raw)
                .map_err(|e| DispositionError::internal(format!("stored tag {raw:?}: {e}")))
        })
        .transpose()
}

fn stray_status(raw: &str) -> Result<StrayStatus> {
    StrayStatus::parse(raw).map_err(|e| DispositionError::internal(e.to_string()))
}

fn request_status(raw: &str) -> Result<RequestStatus> {
    RequestStatus::parse(raw).map_err(|e| DispositionError::internal(e.to_string()))
}

pub(crate) fn row_to_stray(row: &PgRow) -> Result<StrayAnimal> {
    Ok(StrayAnimal {
        id: StrayId::new(column(row, "id")?),
        species: column(row, "species")?,
        breed: column(row, "breed")?,
        sex: column(row, "sex")?,
        markings: column(row, "markings")?,
        capture_location: column(row, "capture_location")?,
        hardware_tag: tag_column(row, "hardware_tag")?,
        status: stray_status(&column::<String>(row, "status")?)?,
        captured_at: column(row, "captured_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn row_to_owner(row: &PgRow) -> Result<Owner> {
    Ok(Owner {
        id: OwnerId::new(column(row, "id")?),
        full_name: column(row, "full_name")?,
        phone: column(row, "phone")?,
        email: column(row, "email")?,
        address: column(row, "address")?,
        pet_count: column(row, "pet_count")?,
        created_at: column(row, "created_at")?,
    })
}

pub(crate) fn row_to_pet(row: &PgRow) -> Result<Pet> {
    Ok(Pet {
        id: PetId::new(column(row, "id")?),
        owner_id: OwnerId::new(column(row, "owner_id")?),
        hardware_tag: tag_column(row, "hardware_tag")?,
        description: PetDescription {
            species: column(row, "species")?,
            breed: column(row, "breed")?,
            sex: column(row, "sex")?,
            markings: column(row, "markings")?,
        },
        status: PetStatus::parse(&column::<String>(row, "status")?)?,
        capture_count: column(row, "capture_count")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn row_to_request(kind: RequestKind, row: &PgRow) -> Result<DispositionRequest> {
    let details = match kind {
        RequestKind::Adoption => RequestDetails::Adoption {
            applicant: column::<Json<ApplicantDetails>>(row, "applicant")?.0,
        },
        RequestKind::Redemption => RequestDetails::Redemption {
            proof: column::<Json<Attachments>>(row, "proof")?.0,
            contact_phone: column(row, "contact_phone")?,
        },
    };
    Ok(DispositionRequest {
        id: RequestId::new(column(row, "id")?),
        stray_id: StrayId::new(column(row, "stray_id")?),
        requester_id: OwnerId::new(column(row, "requester_id")?),
        status: request_status(&column::<String>(row, "status")?)?,
        details,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn row_to_listing(kind: RequestKind, row: &PgRow) -> Result<RequestListing> {
    Ok(RequestListing {
        request: row_to_request(kind, row)?,
        stray_species: column(row, "stray_species")?,
        stray_status: stray_status(&column::<String>(row, "stray_status")?)?,
        stray_tag: tag_column(row, "stray_tag")?,
        requester_name: column(row, "requester_name")?,
        requester_phone: column(row, "requester_phone")?,
    })
}
