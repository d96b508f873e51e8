//! `PostgreSQL` entity store for the disposition engine.
//!
//! This crate provides the production implementation of the
//! [`EntityStore`] trait from `animal-control-core`. It uses sqlx runtime
//! queries and supports:
//!
//! - One database transaction per service operation
//! - Blocking row locks (`SELECT … FOR UPDATE`) for the `lock_*` reads
//! - Savepoints around best-effort counter updates, so a failed update does
//!   not poison the surrounding transaction
//! - Embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use animal_control_postgres::PostgresEntityStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresEntityStore::new("postgres://localhost/animal_control").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

use animal_control_core::error::{DispositionError, Result};
use animal_control_core::lifecycle::{RequestStatus, StrayStatus};
use animal_control_core::store::{EntityStore, StoreTransaction};
use animal_control_core::types::{
    DispositionRequest, HardwareTag, NewOwner, NewPet, NewRequest, NewStray, Owner, OwnerId, Pet,
    PetCountCorrection, PetId, RequestDetails, RequestFilter, RequestId, RequestKind,
    RequestListing, StrayAnimal, StrayId,
};
use chrono::{DateTime, Utc};
use rows::{
    OWNER_COLUMNS, PET_COLUMNS, STRAY_COLUMNS, request_columns, request_table, row_to_listing,
    row_to_owner, row_to_pet, row_to_request, row_to_stray, storage, tag_write,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Connection, PgPool, Postgres, Row};

/// `PostgreSQL`-backed entity store.
#[derive(Clone, Debug)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Connect to `database_url` with a default pool.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(storage("connect"))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DispositionError::internal(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

impl EntityStore for PostgresEntityStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await.map_err(storage("begin transaction"))?;
        Ok(PostgresTransaction { tx })
    }
}

/// An open database transaction.
///
/// Dropping it without calling [`StoreTransaction::commit`] rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn fetch_stray(&mut self, id: StrayId, lock: bool) -> Result<Option<StrayAnimal>> {
        let sql = format!(
            "SELECT {STRAY_COLUMNS} FROM stray_animal WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage("load stray"))?
            .as_ref()
            .map(row_to_stray)
            .transpose()
    }

    async fn fetch_request(
        &mut self,
        kind: RequestKind,
        id: RequestId,
        lock: bool,
    ) -> Result<Option<DispositionRequest>> {
        let sql = format!(
            "SELECT {} FROM {} r WHERE r.id = $1{}",
            request_columns(kind),
            request_table(kind),
            if lock { " FOR UPDATE" } else { "" }
        );
        sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage("load request"))?
            .as_ref()
            .map(|row| row_to_request(kind, row))
            .transpose()
    }

    async fn fetch_pets(&mut self, tag: &HardwareTag, lock: bool) -> Result<Vec<Pet>> {
        let sql = format!(
            "SELECT {PET_COLUMNS} FROM pet WHERE hardware_tag = $1 ORDER BY id{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        sqlx::query(&sql)
            .bind(tag.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(storage("load pets"))?
            .iter()
            .map(row_to_pet)
            .collect()
    }
}

impl StoreTransaction for PostgresTransaction {
    async fn find_stray(&mut self, id: StrayId) -> Result<Option<StrayAnimal>> {
        self.fetch_stray(id, false).await
    }

    async fn lock_stray(&mut self, id: StrayId) -> Result<Option<StrayAnimal>> {
        self.fetch_stray(id, true).await
    }

    async fn find_stray_by_tag(&mut self, tag: &HardwareTag) -> Result<Option<StrayAnimal>> {
        let sql = format!("SELECT {STRAY_COLUMNS} FROM stray_animal WHERE hardware_tag = $1");
        sqlx::query(&sql)
            .bind(tag.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage("load stray by tag"))?
            .as_ref()
            .map(row_to_stray)
            .transpose()
    }

    async fn insert_stray(
        &mut self,
        stray: NewStray,
        captured_at: DateTime<Utc>,
    ) -> Result<StrayAnimal> {
        let sql = format!(
            "INSERT INTO stray_animal \
                 (species, breed, sex, markings, capture_location, hardware_tag, status, \
                  captured_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             RETURNING {STRAY_COLUMNS}"
        );
        let query = sqlx::query(&sql)
            .bind(&stray.species)
            .bind(&stray.breed)
            .bind(&stray.sex)
            .bind(&stray.markings)
            .bind(&stray.capture_location)
            .bind(stray.hardware_tag.as_ref().map(HardwareTag::as_str))
            .bind(StrayStatus::Captured.as_str())
            .bind(captured_at);
        let row = match &stray.hardware_tag {
            Some(tag) => query
                .fetch_one(&mut *self.tx)
                .await
                .map_err(tag_write("insert stray", tag))?,
            None => query
                .fetch_one(&mut *self.tx)
                .await
                .map_err(storage("insert stray"))?,
        };
        row_to_stray(&row)
    }

    async fn set_stray_status(
        &mut self,
        id: StrayId,
        status: StrayStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE stray_animal SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.get())
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(storage("update stray status"))?;
        Ok(())
    }

    async fn assign_stray_tag(
        &mut self,
        id: StrayId,
        tag: &HardwareTag,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE stray_animal SET hardware_tag = $2, updated_at = $3 WHERE id = $1")
            .bind(id.get())
            .bind(tag.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(tag_write("assign stray tag", tag))?;
        Ok(())
    }

    async fn find_owner(&mut self, id: OwnerId) -> Result<Option<Owner>> {
        let sql = format!("SELECT {OWNER_COLUMNS} FROM pet_owner WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage("load owner"))?
            .as_ref()
            .map(row_to_owner)
            .transpose()
    }

    async fn insert_owner(&mut self, owner: NewOwner, created_at: DateTime<Utc>) -> Result<Owner> {
        let sql = format!(
            "INSERT INTO pet_owner (full_name, phone, email, address, pet_count, created_at) \
             VALUES ($1, $2, $3, $4, 0, $5) \
             RETURNING {OWNER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&owner.full_name)
            .bind(&owner.phone)
            .bind(&owner.email)
            .bind(&owner.address)
            .bind(created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage("insert owner"))?;
        row_to_owner(&row)
    }

    async fn adjust_pet_count(&mut self, owner: OwnerId, delta: i32) -> Result<()> {
        let mut savepoint = Connection::begin(&mut *self.tx)
            .await
            .map_err(storage("open savepoint"))?;
        let result = sqlx::query(
            "UPDATE pet_owner SET pet_count = GREATEST(pet_count + $2, 0) WHERE id = $1",
        )
        .bind(owner.get())
        .bind(delta)
        .execute(&mut *savepoint)
        .await;

        match result {
            Ok(_) => savepoint.commit().await.map_err(storage("release savepoint")),
            Err(e) => {
                if let Err(rollback) = savepoint.rollback().await {
                    tracing::error!(error = %rollback, "rollback to savepoint failed");
                }
                Err(storage("adjust pet_count")(e))
            }
        }
    }

    async fn recompute_pet_counts(
        &mut self,
        owner: Option<OwnerId>,
    ) -> Result<Vec<PetCountCorrection>> {
        let rows = sqlx::query(
            r"
            WITH counted AS (
                SELECT o.id, o.pet_count AS previous, COUNT(p.id)::INT AS actual
                FROM pet_owner o
                LEFT JOIN pet p ON p.owner_id = o.id
                WHERE $1::BIGINT IS NULL OR o.id = $1
                GROUP BY o.id, o.pet_count
            )
            UPDATE pet_owner o
            SET pet_count = counted.actual
            FROM counted
            WHERE o.id = counted.id AND counted.previous <> counted.actual
            RETURNING o.id, counted.previous, counted.actual
            ",
        )
        .bind(owner.map(OwnerId::get))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage("recompute pet counts"))?;

        let mut corrections = rows
            .iter()
            .map(|row: &PgRow| {
                let decode =
                    |e: sqlx::Error| DispositionError::internal(format!("decode correction: {e}"));
                Ok(PetCountCorrection {
                    owner_id: OwnerId::new(row.try_get("id").map_err(decode)?),
                    previous: row.try_get("previous").map_err(decode)?,
                    actual: row.try_get("actual").map_err(decode)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        corrections.sort_by_key(|c| c.owner_id);
        Ok(corrections)
    }

    async fn find_request(
        &mut self,
        kind: RequestKind,
        id: RequestId,
    ) -> Result<Option<DispositionRequest>> {
        self.fetch_request(kind, id, false).await
    }

    async fn lock_request(
        &mut self,
        kind: RequestKind,
        id: RequestId,
    ) -> Result<Option<DispositionRequest>> {
        self.fetch_request(kind, id, true).await
    }

    async fn insert_request(
        &mut self,
        request: NewRequest,
        created_at: DateTime<Utc>,
    ) -> Result<DispositionRequest> {
        let kind = request.details.kind();
        let columns = request_columns(kind);
        let row = match request.details {
            RequestDetails::Adoption { applicant } => {
                let sql = format!(
                    "INSERT INTO adoption_request AS r \
                         (stray_id, requester_id, status, applicant, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $5) \
                     RETURNING {columns}"
                );
                sqlx::query(&sql)
                    .bind(request.stray_id.get())
                    .bind(request.requester_id.get())
                    .bind(RequestStatus::Pending.as_str())
                    .bind(Json(applicant))
                    .bind(created_at)
                    .fetch_one(&mut *self.tx)
                    .await
            }
            RequestDetails::Redemption {
                proof,
                contact_phone,
            } => {
                let sql = format!(
                    "INSERT INTO redemption_request AS r \
                         (stray_id, requester_id, status, proof, contact_phone, created_at, \
                          updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $6) \
                     RETURNING {columns}"
                );
                sqlx::query(&sql)
                    .bind(request.stray_id.get())
                    .bind(request.requester_id.get())
                    .bind(RequestStatus::Pending.as_str())
                    .bind(Json(proof))
                    .bind(contact_phone)
                    .bind(created_at)
                    .fetch_one(&mut *self.tx)
                    .await
            }
        }
        .map_err(storage("insert request"))?;
        row_to_request(kind, &row)
    }

    async fn set_request_status(
        &mut self,
        kind: RequestKind,
        id: RequestId,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET status = $2, updated_at = $3 WHERE id = $1",
            request_table(kind)
        );
        sqlx::query(&sql)
            .bind(id.get())
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(storage("update request status"))?;
        Ok(())
    }

    async fn reject_pending_adoptions(
        &mut self,
        stray: StrayId,
        keep: RequestId,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE adoption_request SET status = 'rejected', updated_at = $3 \
             WHERE stray_id = $1 AND id <> $2 AND status = 'pending'",
        )
        .bind(stray.get())
        .bind(keep.get())
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage("reject competing adoptions"))?;
        Ok(done.rows_affected())
    }

    async fn reject_open_requests(
        &mut self,
        kind: RequestKind,
        stray: StrayId,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET status = 'rejected', updated_at = $2 \
             WHERE stray_id = $1 AND status IN ('pending', 'approved')",
            request_table(kind)
        );
        let done = sqlx::query(&sql)
            .bind(stray.get())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(storage("reject open requests"))?;
        Ok(done.rows_affected())
    }

    async fn delete_redemptions(&mut self, stray: StrayId) -> Result<u64> {
        let done = sqlx::query(
            "DELETE FROM redemption_request WHERE stray_id = $1 AND status <> 'archived'",
        )
        .bind(stray.get())
        .execute(&mut *self.tx)
        .await
        .map_err(storage("delete redemptions"))?;
        Ok(done.rows_affected())
    }

    async fn list_requests(&mut self, filter: RequestFilter) -> Result<Vec<RequestListing>> {
        let exclusion = match filter.kind {
            RequestKind::Redemption => " AND s.status NOT IN ('adoption', 'adopted')",
            RequestKind::Adoption => "",
        };
        let sql = format!(
            "SELECT {}, s.species AS stray_species, s.status AS stray_status, \
                    s.hardware_tag AS stray_tag, o.full_name AS requester_name, \
                    o.phone AS requester_phone \
             FROM {} r \
             JOIN stray_animal s ON s.id = r.stray_id \
             JOIN pet_owner o ON o.id = r.requester_id \
             WHERE ($1::BIGINT IS NULL OR r.requester_id = $1) \
               AND ($2::TEXT IS NULL OR r.status = $2){exclusion} \
             ORDER BY r.created_at DESC, r.id DESC",
            request_columns(filter.kind),
            request_table(filter.kind),
        );
        sqlx::query(&sql)
            .bind(filter.requester_id.map(OwnerId::get))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(storage("list requests"))?
            .iter()
            .map(|row| row_to_listing(filter.kind, row))
            .collect()
    }

    async fn find_pets_by_tag(&mut self, tag: &HardwareTag) -> Result<Vec<Pet>> {
        self.fetch_pets(tag, false).await
    }

    async fn lock_pets_by_tag(&mut self, tag: &HardwareTag) -> Result<Vec<Pet>> {
        self.fetch_pets(tag, true).await
    }

    async fn insert_pet(&mut self, pet: NewPet, at: DateTime<Utc>) -> Result<Pet> {
        let sql = format!(
            "INSERT INTO pet \
                 (owner_id, hardware_tag, species, breed, sex, markings, status, capture_count, \
                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $8) \
             RETURNING {PET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(pet.owner_id.get())
            .bind(pet.hardware_tag.as_ref().map(HardwareTag::as_str))
            .bind(&pet.description.species)
            .bind(&pet.description.breed)
            .bind(&pet.description.sex)
            .bind(&pet.description.markings)
            .bind(pet.status.as_str())
            .bind(at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage("insert pet"))?;
        row_to_pet(&row)
    }

    async fn update_pet(&mut self, pet: &Pet) -> Result<()> {
        sqlx::query(
            "UPDATE pet SET owner_id = $2, hardware_tag = $3, species = $4, breed = $5, \
                 sex = $6, markings = $7, status = $8, updated_at = $9 \
             WHERE id = $1",
        )
        .bind(pet.id.get())
        .bind(pet.owner_id.get())
        .bind(pet.hardware_tag.as_ref().map(HardwareTag::as_str))
        .bind(&pet.description.species)
        .bind(&pet.description.breed)
        .bind(&pet.description.sex)
        .bind(&pet.description.markings)
        .bind(pet.status.as_str())
        .bind(pet.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage("update pet"))?;
        Ok(())
    }

    async fn delete_pets(&mut self, ids: &[PetId]) -> Result<u64> {
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let done = sqlx::query("DELETE FROM pet WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await
            .map_err(storage("delete pets"))?;
        Ok(done.rows_affected())
    }

    async fn increment_capture_count(&mut self, id: PetId) -> Result<()> {
        sqlx::query("UPDATE pet SET capture_count = capture_count + 1 WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(storage("increment capture count"))?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(storage("commit"))
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(storage("rollback"))
    }
}
