//! PostgreSQL store for finance-service.

use crate::models::{
    Account, AccountOverview, BalanceSnapshot, DatedAccountBalance, Institution,
    InstitutionStatus, ManualAsset, ManualAssetUpdate, NewAccount, NewInstitution, NewSnapshot,
    NewTransaction, SnapshotSource, SnapshotWrite, SyncFrequency, Transaction,
    TransactionSummary, TransactionUpdate, TransactionWithAccount, User,
};
use crate::services::filter::{TransactionFilter, TransactionPage};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::Store;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const USER_COLUMNS: &str = "user_id, email, password_hash, sync_frequency, created_utc";

const INSTITUTION_COLUMNS: &str = "institution_id, user_id, item_id, access_token_encrypted, \
     institution_name, status, created_utc, updated_utc";

const ACCOUNT_COLUMNS: &str = "account_id, user_id, institution_id, provider_account_id, name, \
     official_name, mask, account_type, subtype, is_active, created_utc";

const SNAPSHOT_COLUMNS: &str =
    "snapshot_id, user_id, account_id, date, balance, source, is_stale, created_utc";

const TRANSACTION_COLUMNS: &str = "transaction_id, user_id, account_id, provider_transaction_id, \
     amount, date, authorized_date, name, merchant_name, original_description, raw_category, \
     personal_category, is_transfer, is_pending, created_utc";

const MANUAL_ASSET_COLUMNS: &str =
    "asset_id, user_id, name, current_value, created_utc, updated_utc";

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Escape LIKE metacharacters so user input matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Translate a [`TransactionFilter`] into SQL predicates over `transactions t`.
///
/// The cursor is resolved against the caller's own rows so a foreign or
/// unknown id yields an empty page.
pub(crate) fn push_transaction_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    user_id: Uuid,
    filter: &TransactionFilter,
) {
    if !filter.include_pending {
        qb.push(" AND NOT t.is_pending");
    }
    if let Some(from) = filter.from {
        qb.push(" AND t.date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND t.date <= ").push_bind(to);
    }
    if let Some(account_id) = filter.account_id {
        qb.push(" AND t.account_id = ").push_bind(account_id);
    }
    if let Some(category) = &filter.category {
        qb.push(" AND (t.personal_category = ")
            .push_bind(category.clone())
            .push(" OR ")
            .push_bind(category.clone())
            .push(" = ANY(t.raw_category))");
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (t.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR t.merchant_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(cursor) = filter.cursor {
        qb.push(" AND (t.date, t.transaction_id) < (SELECT c.date, c.transaction_id FROM transactions c WHERE c.user_id = ")
            .push_bind(user_id)
            .push(" AND c.transaction_id = ")
            .push_bind(cursor)
            .push(")");
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "finance-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Close the pool once in-flight work has finished.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }
}

#[async_trait]
impl Store for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("Health check failed"))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    #[instrument(skip(self, password_hash))]
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        sync_frequency: SyncFrequency,
    ) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let result = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (user_id, email, password_hash, sync_frequency) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(sync_frequency.as_str())
        .fetch_one(&self.pool)
        .await;

        timer.observe_duration();

        match result {
            Ok(user) => {
                info!(user_id = %user.user_id, "User created");
                Ok(user)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                AppError::Conflict(anyhow::anyhow!("An account with this email already exists")),
            ),
            Err(e) => Err(db_error("Failed to create user")(e)),
        }
    }

    #[instrument(skip(self))]
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get user"))?;

        timer.observe_duration();
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user_by_email"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get user by email"))?;

        timer.observe_duration();
        Ok(user)
    }

    #[instrument(skip(self), fields(frequency = %frequency))]
    async fn list_user_ids_by_frequency(
        &self,
        frequency: SyncFrequency,
    ) -> Result<Vec<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_user_ids_by_frequency"])
            .start_timer();

        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM users WHERE sync_frequency = $1 ORDER BY created_utc",
        )
        .bind(frequency.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list users by sync frequency"))?;

        timer.observe_duration();
        Ok(ids)
    }

    // =========================================================================
    // Institution Operations
    // =========================================================================

    #[instrument(skip(self, new), fields(user_id = %new.user_id))]
    async fn create_institution(&self, new: NewInstitution) -> Result<Institution, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_institution"])
            .start_timer();

        let institution = sqlx::query_as::<_, Institution>(&format!(
            "INSERT INTO institutions (institution_id, user_id, item_id, access_token_encrypted, institution_name, status) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {INSTITUTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.item_id)
        .bind(&new.access_token_encrypted)
        .bind(&new.institution_name)
        .bind(InstitutionStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create institution"))?;

        timer.observe_duration();
        info!(institution_id = %institution.institution_id, "Institution created");
        Ok(institution)
    }

    #[instrument(skip(self))]
    async fn list_active_institutions(&self, user_id: Uuid) -> Result<Vec<Institution>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_institutions"])
            .start_timer();

        let institutions = sqlx::query_as::<_, Institution>(&format!(
            "SELECT {INSTITUTION_COLUMNS} FROM institutions \
             WHERE user_id = $1 AND status = $2 ORDER BY created_utc"
        ))
        .bind(user_id)
        .bind(InstitutionStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list institutions"))?;

        timer.observe_duration();
        Ok(institutions)
    }

    #[instrument(skip(self))]
    async fn set_institution_status(
        &self,
        institution_id: Uuid,
        status: InstitutionStatus,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_institution_status"])
            .start_timer();

        sqlx::query(
            "UPDATE institutions SET status = $2, updated_utc = NOW() WHERE institution_id = $1",
        )
        .bind(institution_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update institution status"))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    #[instrument(skip(self, new), fields(user_id = %new.user_id))]
    async fn create_account(&self, new: NewAccount) -> Result<Account, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO accounts (account_id, user_id, institution_id, provider_account_id, name, official_name, mask, account_type, subtype) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.institution_id)
        .bind(&new.provider_account_id)
        .bind(&new.name)
        .bind(&new.official_name)
        .bind(&new.mask)
        .bind(&new.account_type)
        .bind(&new.subtype)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create account"))?;

        timer.observe_duration();
        Ok(account)
    }

    #[instrument(skip(self))]
    async fn get_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 AND account_id = $2"
        ))
        .bind(user_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get account"))?;

        timer.observe_duration();
        Ok(account)
    }

    #[instrument(skip(self))]
    async fn list_active_accounts(&self, user_id: Uuid) -> Result<Vec<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_accounts"])
            .start_timer();

        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE user_id = $1 AND is_active ORDER BY created_utc"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list accounts"))?;

        timer.observe_duration();
        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn list_active_institution_accounts(
        &self,
        institution_id: Uuid,
    ) -> Result<Vec<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_institution_accounts"])
            .start_timer();

        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE institution_id = $1 AND is_active ORDER BY created_utc"
        ))
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list institution accounts"))?;

        timer.observe_duration();
        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn list_account_overviews(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<AccountOverview>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_account_overviews"])
            .start_timer();

        let overviews = sqlx::query_as::<_, AccountOverview>(
            r#"
            SELECT a.account_id, a.user_id, a.institution_id, a.provider_account_id, a.name,
                   a.official_name, a.mask, a.account_type, a.subtype, a.is_active, a.created_utc,
                   i.institution_name, i.status AS institution_status,
                   s.balance, s.date AS balance_date
            FROM accounts a
            LEFT JOIN institutions i ON i.institution_id = a.institution_id
            LEFT JOIN LATERAL (
                SELECT balance, date FROM balance_snapshots
                WHERE account_id = a.account_id
                ORDER BY date DESC
                LIMIT 1
            ) s ON TRUE
            WHERE a.user_id = $1 AND a.is_active
            ORDER BY a.created_utc
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list account overviews"))?;

        timer.observe_duration();
        Ok(overviews)
    }

    #[instrument(skip(self))]
    async fn set_account_active(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        is_active: bool,
    ) -> Result<Option<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_account_active"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET is_active = $3 WHERE user_id = $1 AND account_id = $2 \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(user_id)
        .bind(account_id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update account"))?;

        timer.observe_duration();
        Ok(account)
    }

    // =========================================================================
    // Balance Snapshot Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn get_snapshot(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<BalanceSnapshot>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_snapshot"])
            .start_timer();

        let snapshot = sqlx::query_as::<_, BalanceSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots \
             WHERE user_id = $1 AND account_id = $2 AND date = $3"
        ))
        .bind(user_id)
        .bind(account_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get snapshot"))?;

        timer.observe_duration();
        Ok(snapshot)
    }

    #[instrument(skip(self, snapshot), fields(account_id = %snapshot.account_id, date = %snapshot.date))]
    async fn write_snapshot(&self, snapshot: NewSnapshot) -> Result<SnapshotWrite, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["write_snapshot"])
            .start_timer();

        // xmax is zero for a freshly inserted row and non-zero after the upsert branch.
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO balance_snapshots (snapshot_id, user_id, account_id, date, balance, source, is_stale)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, account_id, date) DO UPDATE
                SET balance = EXCLUDED.balance,
                    source = EXCLUDED.source,
                    is_stale = EXCLUDED.is_stale
                WHERE balance_snapshots.source = 'forward_fill' AND EXCLUDED.source = 'plaid'
            RETURNING (xmax = 0)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(snapshot.user_id)
        .bind(snapshot.account_id)
        .bind(snapshot.date)
        .bind(snapshot.balance)
        .bind(snapshot.source.as_str())
        .bind(snapshot.source.is_stale())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to write snapshot"))?;

        timer.observe_duration();

        Ok(match inserted {
            Some(true) => SnapshotWrite::Inserted,
            Some(false) => SnapshotWrite::ReplacedForwardFill,
            None => SnapshotWrite::Unchanged,
        })
    }

    #[instrument(skip(self))]
    async fn latest_snapshot(
        &self,
        account_id: Uuid,
    ) -> Result<Option<BalanceSnapshot>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["latest_snapshot"])
            .start_timer();

        let snapshot = sqlx::query_as::<_, BalanceSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots \
             WHERE account_id = $1 ORDER BY date DESC LIMIT 1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get latest snapshot"))?;

        timer.observe_duration();
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn list_snapshots(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<BalanceSnapshot>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_snapshots"])
            .start_timer();

        let snapshots = sqlx::query_as::<_, BalanceSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots \
             WHERE user_id = $1 AND account_id = $2 \
               AND ($3::date IS NULL OR date >= $3) \
               AND ($4::date IS NULL OR date <= $4) \
             ORDER BY date"
        ))
        .bind(user_id)
        .bind(account_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list snapshots"))?;

        timer.observe_duration();
        Ok(snapshots)
    }

    #[instrument(skip(self))]
    async fn list_active_balances_between(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DatedAccountBalance>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_balances_between"])
            .start_timer();

        let balances = sqlx::query_as::<_, DatedAccountBalance>(
            r#"
            SELECT s.date, s.balance, a.account_id, a.name AS account_name, a.account_type
            FROM balance_snapshots s
            JOIN accounts a ON a.account_id = s.account_id
            WHERE s.user_id = $1 AND a.is_active AND s.date BETWEEN $2 AND $3
            ORDER BY s.date, a.created_utc
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list balances"))?;

        timer.observe_duration();
        Ok(balances)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn transaction_exists(&self, provider_transaction_id: &str) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transaction_exists"])
            .start_timer();

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE provider_transaction_id = $1)",
        )
        .bind(provider_transaction_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to check transaction"))?;

        timer.observe_duration();
        Ok(exists)
    }

    #[instrument(skip(self, new), fields(provider_transaction_id = %new.provider_transaction_id))]
    async fn insert_transaction(&self, new: NewTransaction) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_transaction"])
            .start_timer();

        let result = sqlx::query(
            r#"
            INSERT INTO transactions (transaction_id, user_id, account_id, provider_transaction_id, amount, date,
                                      authorized_date, name, merchant_name, original_description, raw_category,
                                      personal_category, is_transfer, is_pending)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (provider_transaction_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.account_id)
        .bind(&new.provider_transaction_id)
        .bind(new.amount)
        .bind(new.date)
        .bind(new.authorized_date)
        .bind(&new.name)
        .bind(&new.merchant_name)
        .bind(&new.original_description)
        .bind(&new.raw_category)
        .bind(&new.personal_category)
        .bind(new.is_transfer)
        .bind(new.is_pending)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert transaction"))?;

        timer.observe_duration();
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn list_transaction_summaries(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TransactionSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transaction_summaries"])
            .start_timer();

        let summaries = sqlx::query_as::<_, TransactionSummary>(
            "SELECT amount, date, account_id, name FROM transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list transaction summaries"))?;

        timer.observe_duration();
        Ok(summaries)
    }

    #[instrument(skip(self, filter))]
    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transactions"])
            .start_timer();

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT t.transaction_id, t.user_id, t.account_id, t.provider_transaction_id, t.amount, \
             t.date, t.authorized_date, t.name, t.merchant_name, t.original_description, \
             t.raw_category, t.personal_category, t.is_transfer, t.is_pending, t.created_utc, \
             a.name AS account_name, a.account_type \
             FROM transactions t JOIN accounts a ON a.account_id = t.account_id \
             WHERE t.user_id = ",
        );
        qb.push_bind(user_id);
        push_transaction_filter(&mut qb, user_id, filter);
        qb.push(" ORDER BY t.date DESC, t.transaction_id DESC LIMIT ")
            .push_bind(filter.limit + 1);

        let rows = qb
            .build_query_as::<TransactionWithAccount>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list transactions"))?;

        timer.observe_duration();
        Ok(TransactionPage::from_rows(rows, filter.limit))
    }

    #[instrument(skip(self))]
    async fn list_spending_transactions(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_spending_transactions"])
            .start_timer();

        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE user_id = $1 AND date BETWEEN $2 AND $3 \
               AND NOT is_pending AND NOT is_transfer \
             ORDER BY date"
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list spending transactions"))?;

        timer.observe_duration();
        Ok(transactions)
    }

    #[instrument(skip(self, update))]
    async fn update_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        update: TransactionUpdate,
    ) -> Result<Option<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_transaction"])
            .start_timer();

        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions \
             SET personal_category = COALESCE($3, personal_category), \
                 merchant_name = COALESCE($4, merchant_name) \
             WHERE user_id = $1 AND transaction_id = $2 \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(transaction_id)
        .bind(update.personal_category)
        .bind(update.merchant_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update transaction"))?;

        timer.observe_duration();
        Ok(transaction)
    }

    // =========================================================================
    // Manual Asset Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn list_manual_assets(&self, user_id: Uuid) -> Result<Vec<ManualAsset>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_manual_assets"])
            .start_timer();

        let assets = sqlx::query_as::<_, ManualAsset>(&format!(
            "SELECT {MANUAL_ASSET_COLUMNS} FROM manual_assets \
             WHERE user_id = $1 ORDER BY created_utc DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list manual assets"))?;

        timer.observe_duration();
        Ok(assets)
    }

    #[instrument(skip(self))]
    async fn create_manual_asset(
        &self,
        user_id: Uuid,
        name: &str,
        current_value: Decimal,
    ) -> Result<ManualAsset, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_manual_asset"])
            .start_timer();

        let asset = sqlx::query_as::<_, ManualAsset>(&format!(
            "INSERT INTO manual_assets (asset_id, user_id, name, current_value) \
             VALUES ($1, $2, $3, $4) RETURNING {MANUAL_ASSET_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .bind(current_value)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create manual asset"))?;

        timer.observe_duration();
        info!(asset_id = %asset.asset_id, "Manual asset created");
        Ok(asset)
    }

    #[instrument(skip(self, update))]
    async fn update_manual_asset(
        &self,
        user_id: Uuid,
        asset_id: Uuid,
        update: ManualAssetUpdate,
    ) -> Result<Option<ManualAsset>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_manual_asset"])
            .start_timer();

        let asset = sqlx::query_as::<_, ManualAsset>(&format!(
            "UPDATE manual_assets \
             SET name = COALESCE($3, name), \
                 current_value = COALESCE($4, current_value), \
                 updated_utc = NOW() \
             WHERE user_id = $1 AND asset_id = $2 \
             RETURNING {MANUAL_ASSET_COLUMNS}"
        ))
        .bind(user_id)
        .bind(asset_id)
        .bind(update.name)
        .bind(update.current_value)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update manual asset"))?;

        timer.observe_duration();
        Ok(asset)
    }

    #[instrument(skip(self))]
    async fn delete_manual_asset(&self, user_id: Uuid, asset_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_manual_asset"])
            .start_timer();

        let result = sqlx::query("DELETE FROM manual_assets WHERE user_id = $1 AND asset_id = $2")
            .bind(user_id)
            .bind(asset_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete manual asset"))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }
}
