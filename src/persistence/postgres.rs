//! PostgreSQL implementation of the store traits.
//!
//! Every mutating method runs in one database transaction and takes
//! `SELECT ... FOR UPDATE` on the aggregate row (sponsorship or
//! consultation) before applying the domain rule. Locks are always taken in
//! the order sponsorship, then transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use super::models::{
    CallRow, ConsultationRow, MethodStatsRow, SponsorshipRow, TransactionRow, UserRow,
};
use super::{
    ConsultationStore, DonationDraft, EndedCall, LedgerStore, RecordedDonation, RefundedDonation,
    SettledPayment, Settlement, StartedCall, UserStore, apply_draft, apply_refund,
    apply_settlement, check_replay, complete_after_call, select_call_to_end,
};
use crate::config::HealthPalConfig;
use crate::domain::{
    Call, CallId, CallModality, Consultation, ConsultationId, ConsultationStatus, MethodStats,
    Sponsorship, SponsorshipId, SponsorshipStatus, Transaction, TransactionId, UserId,
    UserProfile,
};
use crate::error::HealthPalError;

const SPONSORSHIP_COLUMNS: &str = "id, beneficiary_id, treatment_type, goal_amount_cents, \
     donated_amount_cents, status, description, created_at";

const TRANSACTION_COLUMNS: &str = "id, sponsorship_id, donor_id, amount_cents, payment_method, \
     status, external_payment_ref, receipt_url, created_at, updated_at";

const CONSULTATION_COLUMNS: &str =
    "id, patient_id, doctor_id, scheduled_time, mode, status, notes, created_at";

const CALL_COLUMNS: &str =
    "id, consultation_id, initiator_id, modality, status, started_at, ended_at, duration_seconds";

/// Maps a driver error, turning constraint violations into typed errors.
fn db_err(err: sqlx::Error) -> HealthPalError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let constraint = db.constraint().unwrap_or("unique constraint");
            return HealthPalError::Duplicate(format!("record violates {constraint}"));
        }
        if db.is_foreign_key_violation() {
            return HealthPalError::InvalidRequest(format!(
                "referenced record does not exist ({})",
                db.constraint().unwrap_or("foreign key")
            ));
        }
    }
    HealthPalError::Persistence(err.to_string())
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Persistence`] if the database is unreachable.
    pub async fn connect(config: &HealthPalConfig) -> Result<Self, HealthPalError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), HealthPalError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| HealthPalError::Persistence(format!("migration failed: {e}")))
    }

    /// Closes every pooled connection. Called once on shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn lock_sponsorship(
    conn: &mut PgConnection,
    id: SponsorshipId,
) -> Result<Sponsorship, HealthPalError> {
    let sql = format!("SELECT {SPONSORSHIP_COLUMNS} FROM sponsorships WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, SponsorshipRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| HealthPalError::not_found("sponsorship", id))?
        .try_into()
}

async fn write_sponsorship_funding(
    conn: &mut PgConnection,
    sponsorship: &Sponsorship,
) -> Result<(), HealthPalError> {
    sqlx::query("UPDATE sponsorships SET donated_amount_cents = $2, status = $3 WHERE id = $1")
        .bind(Uuid::from(sponsorship.id))
        .bind(sponsorship.donated_amount.cents())
        .bind(sponsorship.status.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn fetch_transaction<'e>(
    executor: impl PgExecutor<'e>,
    id: TransactionId,
    for_update: bool,
) -> Result<Option<Transaction>, HealthPalError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1{lock}");
    sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(executor)
        .await
        .map_err(db_err)?
        .map(Transaction::try_from)
        .transpose()
}

async fn fetch_transaction_by_ref<'e>(
    executor: impl PgExecutor<'e>,
    external_ref: &str,
) -> Result<Option<Transaction>, HealthPalError> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE external_payment_ref = $1");
    sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(external_ref)
        .fetch_optional(executor)
        .await
        .map_err(db_err)?
        .map(Transaction::try_from)
        .transpose()
}

async fn insert_transaction(
    conn: &mut PgConnection,
    tx: &Transaction,
) -> Result<(), HealthPalError> {
    sqlx::query(
        "INSERT INTO transactions (id, sponsorship_id, donor_id, amount_cents, payment_method, \
         status, external_payment_ref, receipt_url, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(Uuid::from(tx.id))
    .bind(Uuid::from(tx.sponsorship_id))
    .bind(Uuid::from(tx.donor_id))
    .bind(tx.amount.cents())
    .bind(tx.payment_method.as_str())
    .bind(tx.status.as_str())
    .bind(tx.external_payment_ref.as_deref())
    .bind(tx.receipt_url.as_deref())
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn write_transaction_status(
    conn: &mut PgConnection,
    tx: &Transaction,
) -> Result<(), HealthPalError> {
    sqlx::query("UPDATE transactions SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(Uuid::from(tx.id))
        .bind(tx.status.as_str())
        .bind(tx.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn lock_consultation(
    conn: &mut PgConnection,
    id: ConsultationId,
) -> Result<Consultation, HealthPalError> {
    let sql =
        format!("SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, ConsultationRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| HealthPalError::not_found("consultation", id))?
        .try_into()
}

/// Compare-and-swap on the consultation status.
async fn swap_consultation_status(
    conn: &mut PgConnection,
    id: ConsultationId,
    expected: ConsultationStatus,
    next: ConsultationStatus,
) -> Result<(), HealthPalError> {
    let result = sqlx::query("UPDATE consultations SET status = $3 WHERE id = $1 AND status = $2")
        .bind(Uuid::from(id))
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(HealthPalError::InvalidTransition {
            entity: "consultation",
            from: expected.to_string(),
            to: next.to_string(),
        });
    }
    Ok(())
}

async fn fetch_calls(
    conn: &mut PgConnection,
    consultation_id: ConsultationId,
    modality: CallModality,
    active_only: bool,
) -> Result<Vec<Call>, HealthPalError> {
    let filter = if active_only {
        " AND status = 'active' FOR UPDATE"
    } else {
        " ORDER BY started_at DESC"
    };
    let sql = format!(
        "SELECT {CALL_COLUMNS} FROM calls WHERE consultation_id = $1 AND modality = $2{filter}"
    );
    sqlx::query_as::<_, CallRow>(&sql)
        .bind(Uuid::from(consultation_id))
        .bind(modality.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(Call::try_from)
        .collect()
}

async fn write_call_end(conn: &mut PgConnection, call: &Call) -> Result<(), HealthPalError> {
    sqlx::query(
        "UPDATE calls SET status = $2, ended_at = $3, duration_seconds = $4 WHERE id = $1",
    )
    .bind(Uuid::from(call.id))
    .bind(call.status.as_str())
    .bind(call.ended_at)
    .bind(call.duration_seconds)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn insert_sponsorship(&self, s: &Sponsorship) -> Result<(), HealthPalError> {
        sqlx::query(
            "INSERT INTO sponsorships (id, beneficiary_id, treatment_type, goal_amount_cents, \
             donated_amount_cents, status, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::from(s.id))
        .bind(Uuid::from(s.beneficiary_id))
        .bind(&s.treatment_type)
        .bind(s.goal_amount.cents())
        .bind(s.donated_amount.cents())
        .bind(s.status.as_str())
        .bind(&s.description)
        .bind(s.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_sponsorship(
        &self,
        id: SponsorshipId,
    ) -> Result<Option<Sponsorship>, HealthPalError> {
        let sql = format!("SELECT {SPONSORSHIP_COLUMNS} FROM sponsorships WHERE id = $1");
        sqlx::query_as::<_, SponsorshipRow>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(Sponsorship::try_from)
            .transpose()
    }

    async fn list_sponsorships(
        &self,
        status: Option<SponsorshipStatus>,
    ) -> Result<Vec<Sponsorship>, HealthPalError> {
        let rows = if let Some(status) = status {
            let sql = format!(
                "SELECT {SPONSORSHIP_COLUMNS} FROM sponsorships WHERE status = $1 \
                 ORDER BY created_at DESC"
            );
            sqlx::query_as::<_, SponsorshipRow>(&sql)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
        } else {
            let sql =
                format!("SELECT {SPONSORSHIP_COLUMNS} FROM sponsorships ORDER BY created_at DESC");
            sqlx::query_as::<_, SponsorshipRow>(&sql)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(db_err)?;

        rows.into_iter().map(Sponsorship::try_from).collect()
    }

    async fn close_sponsorship(&self, id: SponsorshipId) -> Result<Sponsorship, HealthPalError> {
        let mut db = self.pool.begin().await.map_err(db_err)?;
        let mut sponsorship = lock_sponsorship(&mut db, id).await?;
        sponsorship.close()?;
        write_sponsorship_funding(&mut db, &sponsorship).await?;
        db.commit().await.map_err(db_err)?;
        Ok(sponsorship)
    }

    async fn record_donation(
        &self,
        draft: DonationDraft,
        now: DateTime<Utc>,
    ) -> Result<RecordedDonation, HealthPalError> {
        let mut db = self.pool.begin().await.map_err(db_err)?;
        let mut sponsorship = lock_sponsorship(&mut db, draft.sponsorship_id).await?;

        let existing = match draft.external_payment_ref.as_deref() {
            Some(reference) => fetch_transaction_by_ref(&mut *db, reference).await?,
            None => None,
        };
        if let Some(existing) = existing {
            check_replay(&existing, &draft)?;
            db.rollback().await.map_err(db_err)?;
            return Ok(RecordedDonation {
                transaction: existing,
                sponsorship,
                change: None,
                replayed: true,
            });
        }

        let (transaction, change) = apply_draft(&mut sponsorship, &draft, now)?;
        insert_transaction(&mut db, &transaction).await?;
        if change.is_some() {
            write_sponsorship_funding(&mut db, &sponsorship).await?;
        }
        db.commit().await.map_err(db_err)?;

        Ok(RecordedDonation {
            transaction,
            sponsorship,
            change,
            replayed: false,
        })
    }

    async fn settle_payment(
        &self,
        external_ref: &str,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Option<SettledPayment>, HealthPalError> {
        let mut db = self.pool.begin().await.map_err(db_err)?;
        let Some(found) = fetch_transaction_by_ref(&mut *db, external_ref).await? else {
            return Ok(None);
        };

        let mut sponsorship = lock_sponsorship(&mut db, found.sponsorship_id).await?;
        let mut transaction = fetch_transaction(&mut *db, found.id, true)
            .await?
            .ok_or_else(|| HealthPalError::not_found("transaction", found.id))?;

        let (applied, change) =
            apply_settlement(&mut transaction, &mut sponsorship, settlement, now)?;
        if applied {
            write_transaction_status(&mut db, &transaction).await?;
            if change.is_some() {
                write_sponsorship_funding(&mut db, &sponsorship).await?;
            }
        }
        db.commit().await.map_err(db_err)?;

        Ok(Some(SettledPayment {
            transaction,
            sponsorship,
            change,
            applied,
        }))
    }

    async fn refund_transaction(
        &self,
        id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<RefundedDonation, HealthPalError> {
        let mut db = self.pool.begin().await.map_err(db_err)?;
        let found = fetch_transaction(&mut *db, id, false)
            .await?
            .ok_or_else(|| HealthPalError::not_found("transaction", id))?;

        let mut sponsorship = lock_sponsorship(&mut db, found.sponsorship_id).await?;
        let mut transaction = fetch_transaction(&mut *db, id, true)
            .await?
            .ok_or_else(|| HealthPalError::not_found("transaction", id))?;

        let change = apply_refund(&mut transaction, &mut sponsorship, now)?;
        write_transaction_status(&mut db, &transaction).await?;
        write_sponsorship_funding(&mut db, &sponsorship).await?;
        db.commit().await.map_err(db_err)?;

        Ok(RefundedDonation {
            transaction,
            sponsorship,
            change,
        })
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, HealthPalError> {
        fetch_transaction(&self.pool, id, false).await
    }

    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Transaction>, HealthPalError> {
        fetch_transaction_by_ref(&self.pool, external_ref).await
    }

    async fn list_sponsorship_transactions(
        &self,
        sponsorship_id: SponsorshipId,
    ) -> Result<Vec<Transaction>, HealthPalError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE sponsorship_id = $1 \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(Uuid::from(sponsorship_id))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn list_donor_transactions(
        &self,
        donor_id: UserId,
    ) -> Result<Vec<Transaction>, HealthPalError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE donor_id = $1 \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(Uuid::from(donor_id))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn method_stats(&self) -> Result<Vec<MethodStats>, HealthPalError> {
        sqlx::query_as::<_, MethodStatsRow>(
            "SELECT payment_method, COUNT(*) AS donation_count, \
             COALESCE(SUM(amount_cents), 0)::BIGINT AS total_cents \
             FROM transactions WHERE status = 'completed' \
             GROUP BY payment_method ORDER BY payment_method",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(MethodStats::try_from)
        .collect()
    }
}

#[async_trait]
impl ConsultationStore for PostgresStore {
    async fn insert_consultation(&self, c: &Consultation) -> Result<(), HealthPalError> {
        sqlx::query(
            "INSERT INTO consultations (id, patient_id, doctor_id, scheduled_time, mode, status, \
             notes, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::from(c.id))
        .bind(Uuid::from(c.patient_id))
        .bind(Uuid::from(c.doctor_id))
        .bind(c.scheduled_time)
        .bind(c.mode.as_str())
        .bind(c.status.as_str())
        .bind(&c.notes)
        .bind(c.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_consultation(
        &self,
        id: ConsultationId,
    ) -> Result<Option<Consultation>, HealthPalError> {
        let sql = format!("SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE id = $1");
        sqlx::query_as::<_, ConsultationRow>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(Consultation::try_from)
            .transpose()
    }

    async fn list_consultations_for(
        &self,
        user: UserId,
    ) -> Result<Vec<Consultation>, HealthPalError> {
        let sql = format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations \
             WHERE patient_id = $1 OR doctor_id = $1 ORDER BY scheduled_time"
        );
        sqlx::query_as::<_, ConsultationRow>(&sql)
            .bind(Uuid::from(user))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Consultation::try_from)
            .collect()
    }

    async fn update_consultation_status(
        &self,
        id: ConsultationId,
        actor: UserId,
        next: ConsultationStatus,
        now: DateTime<Utc>,
    ) -> Result<Consultation, HealthPalError> {
        let mut db = self.pool.begin().await.map_err(db_err)?;
        let mut consultation = lock_consultation(&mut db, id).await?;
        let expected = consultation.status;
        consultation.change_status(actor, next)?;

        if !next.allows_calls() {
            for modality in [CallModality::Audio, CallModality::Video] {
                for mut call in fetch_calls(&mut db, id, modality, true).await? {
                    call.finish(now, None)?;
                    write_call_end(&mut db, &call).await?;
                    tracing::warn!(
                        consultation_id = %id,
                        call_id = %call.id,
                        %next,
                        "ended active call on status change"
                    );
                }
            }
        }

        swap_consultation_status(&mut db, id, expected, next).await?;
        db.commit().await.map_err(db_err)?;
        Ok(consultation)
    }

    async fn start_call(
        &self,
        consultation_id: ConsultationId,
        initiator: UserId,
        modality: CallModality,
        now: DateTime<Utc>,
    ) -> Result<StartedCall, HealthPalError> {
        let mut db = self.pool.begin().await.map_err(db_err)?;
        let mut consultation = lock_consultation(&mut db, consultation_id).await?;
        consultation.check_call_start(initiator, modality)?;

        let mut force_ended = fetch_calls(&mut db, consultation_id, modality, true).await?;
        for stale in &mut force_ended {
            stale.finish(now, None)?;
            write_call_end(&mut db, stale).await?;
            tracing::warn!(
                %consultation_id,
                call_id = %stale.id,
                %modality,
                "force-ended active call before starting a new one"
            );
        }

        let call = Call::start(consultation_id, initiator, modality, now);
        let sql = "INSERT INTO calls (id, consultation_id, initiator_id, modality, status, \
                   started_at) VALUES ($1, $2, $3, $4, $5, $6)";
        sqlx::query(sql)
            .bind(Uuid::from(call.id))
            .bind(Uuid::from(consultation_id))
            .bind(Uuid::from(initiator))
            .bind(modality.as_str())
            .bind(call.status.as_str())
            .bind(call.started_at)
            .execute(&mut *db)
            .await
            .map_err(db_err)?;

        let previous = consultation.status;
        if consultation.mark_in_progress()? {
            swap_consultation_status(&mut db, consultation_id, previous, consultation.status)
                .await?;
        }
        db.commit().await.map_err(db_err)?;

        Ok(StartedCall {
            call,
            consultation,
            force_ended,
        })
    }

    async fn end_call(
        &self,
        consultation_id: ConsultationId,
        modality: CallModality,
        actor: UserId,
        call_id: Option<CallId>,
        duration_seconds: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<EndedCall, HealthPalError> {
        let mut db = self.pool.begin().await.map_err(db_err)?;
        let mut consultation = lock_consultation(&mut db, consultation_id).await?;
        consultation.require_participant(actor)?;

        let calls = fetch_calls(&mut db, consultation_id, modality, false).await?;
        let mut call = select_call_to_end(calls, call_id, consultation_id, modality)?;
        call.finish(now, duration_seconds)?;
        write_call_end(&mut db, &call).await?;

        let previous = consultation.status;
        complete_after_call(&mut consultation)?;
        if consultation.status != previous {
            swap_consultation_status(&mut db, consultation_id, previous, consultation.status)
                .await?;
        }
        db.commit().await.map_err(db_err)?;

        Ok(EndedCall { call, consultation })
    }

    async fn list_calls(
        &self,
        consultation_id: ConsultationId,
        modality: CallModality,
    ) -> Result<Vec<Call>, HealthPalError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_calls(&mut conn, consultation_id, modality, false).await
    }

    async fn list_calls_by_initiator(
        &self,
        initiator: UserId,
    ) -> Result<Vec<Call>, HealthPalError> {
        let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE initiator_id = $1");
        sqlx::query_as::<_, CallRow>(&sql)
            .bind(Uuid::from(initiator))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Call::try_from)
            .collect()
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn insert_user(&self, user: &UserProfile) -> Result<(), HealthPalError> {
        sqlx::query(
            "INSERT INTO users (id, full_name, email, phone, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::from(user.id))
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.phone.as_deref())
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match db_err(e) {
            HealthPalError::Duplicate(_) => {
                HealthPalError::Duplicate(format!("email {}", user.email))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, HealthPalError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, full_name, email, phone, role, created_at FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(UserProfile::try_from)
        .transpose()
    }
}
