use crate::models::{NewSnapshot, SnapshotSource, SnapshotWrite};
use crate::services::metrics::record_snapshot;
use crate::services::Store;
use chrono::NaiveDate;
use service_core::error::AppError;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Carry each active account's latest balance forward into every missing
/// day strictly before `today`. Accounts without any snapshot are skipped.
///
/// Returns the number of stale snapshots written.
#[instrument(skip(store), fields(user_id = %user_id))]
pub async fn forward_fill(
    store: &dyn Store,
    user_id: Uuid,
    today: NaiveDate,
) -> Result<u32, AppError> {
    let mut filled = 0;

    for account in store.list_active_accounts(user_id).await? {
        let Some(latest) = store.latest_snapshot(account.account_id).await? else {
            continue;
        };

        let mut day = latest.date.succ_opt();
        while let Some(date) = day.filter(|d| *d < today) {
            let written = store
                .write_snapshot(NewSnapshot {
                    user_id,
                    account_id: account.account_id,
                    date,
                    balance: latest.balance,
                    source: SnapshotSource::ForwardFill,
                })
                .await?;
            if written == SnapshotWrite::Inserted {
                filled += 1;
                record_snapshot(SnapshotSource::ForwardFill.as_str());
            }
            day = date.succ_opt();
        }

        debug!(account_id = %account.account_id, last_known = %latest.date, "Account gap filled");
    }

    Ok(filled)
}
