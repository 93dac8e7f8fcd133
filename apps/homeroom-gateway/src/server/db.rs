use super::{errors::AuthFailure, store::MessageStore};

const CREATE_DIRECT_MESSAGES_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS direct_messages (
                    message_id BIGSERIAL PRIMARY KEY,
                    sender_id TEXT NOT NULL,
                    sender_name TEXT NOT NULL,
                    recipient_id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    kind TEXT NOT NULL DEFAULT 'text',
                    created_at_unix BIGINT NOT NULL,
                    delivered BOOLEAN NOT NULL DEFAULT FALSE
                )";
const CREATE_DIRECT_MESSAGES_PAIR_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_direct_messages_pair
                    ON direct_messages(sender_id, recipient_id, created_at_unix)";
const CREATE_DIRECT_MESSAGES_RECIPIENT_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_direct_messages_recipient
                    ON direct_messages(recipient_id, created_at_unix DESC)";

pub(crate) async fn ensure_db_schema(store: &MessageStore) -> Result<(), AuthFailure> {
    const SCHEMA_INIT_LOCK_ID: i64 = 0x484f_4d45_524f_4f4d;
    let Some(pool) = &store.pool else {
        return Ok(());
    };

    store
        .schema_ready
        .get_or_try_init(|| async move {
            let mut tx = pool.begin().await?;
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(SCHEMA_INIT_LOCK_ID)
                .execute(&mut *tx)
                .await?;

            sqlx::query(CREATE_DIRECT_MESSAGES_TABLE_SQL)
                .execute(&mut *tx)
                .await?;
            sqlx::query(CREATE_DIRECT_MESSAGES_PAIR_INDEX_SQL)
                .execute(&mut *tx)
                .await?;
            sqlx::query(CREATE_DIRECT_MESSAGES_RECIPIENT_INDEX_SQL)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            Ok::<(), sqlx::Error>(())
        })
        .await
        .map_err(|e| {
            tracing::error!(event = "db.init", error = %e);
            AuthFailure::Internal
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        ensure_db_schema, CREATE_DIRECT_MESSAGES_PAIR_INDEX_SQL,
        CREATE_DIRECT_MESSAGES_RECIPIENT_INDEX_SQL, CREATE_DIRECT_MESSAGES_TABLE_SQL,
    };
    use crate::server::store::MessageStore;

    #[tokio::test]
    async fn schema_init_is_noop_and_idempotent_without_database_pool() {
        let store = MessageStore::new(None).expect("store should initialize");
        ensure_db_schema(&store)
            .await
            .expect("schema init without database should succeed");
        ensure_db_schema(&store)
            .await
            .expect("schema init should be idempotent");
    }

    #[test]
    fn schema_statements_define_required_table_and_indexes() {
        assert!(CREATE_DIRECT_MESSAGES_TABLE_SQL.contains("direct_messages"));
        assert!(CREATE_DIRECT_MESSAGES_TABLE_SQL.contains("BIGSERIAL PRIMARY KEY"));
        assert!(CREATE_DIRECT_MESSAGES_PAIR_INDEX_SQL.contains("idx_direct_messages_pair"));
        assert!(
            CREATE_DIRECT_MESSAGES_RECIPIENT_INDEX_SQL.contains("idx_direct_messages_recipient")
        );
    }
}
