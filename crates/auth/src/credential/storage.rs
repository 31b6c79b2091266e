//! 凭证持久化（SQLite）
//!
//! 数据库文件为 `{sqlite_path}/keygate.db`，WAL 模式。
//! 部分唯一索引保证同一身份最多一条「启用且未撤销」的记录。

use super::Credential;
use crate::error::{AuthError, AuthResult};
use keygate_common::with_deadline;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const USABLE_PREDICATE: &str = "enabled = 1 AND revoked_at IS NULL \
     AND (expires_at IS NULL OR expires_at > ?2) \
     AND (entitlement_expires_at IS NULL OR entitlement_expires_at > ?2)";

const SELECT_COLUMNS: &str = "secret_hash, identity, tier, daily_limit, enabled, expires_at, \
     entitlement_expires_at, revoked_at, last_used_at, label, created_at";

type CredentialRow = (
    String,
    String,
    i64,
    Option<i64>,
    bool,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<String>,
    i64,
);

fn from_row(row: CredentialRow) -> Credential {
    let (
        secret_hash,
        identity,
        tier,
        daily_limit,
        enabled,
        expires_at,
        entitlement_expires_at,
        revoked_at,
        last_used_at,
        label,
        created_at,
    ) = row;
    Credential {
        secret_hash,
        identity,
        tier: u8::try_from(tier).unwrap_or(u8::MAX),
        daily_limit: daily_limit.and_then(|l| u64::try_from(l).ok()),
        enabled,
        expires_at,
        entitlement_expires_at,
        revoked_at,
        last_used_at,
        label,
        created_at,
    }
}

/// 凭证存储，克隆后共享连接池
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("pool_size", &self.pool.size())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CredentialStore {
    /// 打开（必要时创建）`{dir}/keygate.db` 并初始化表结构
    pub async fn open(dir: &Path, timeout: Duration) -> AuthResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            AuthError::Config(format!("Failed to create database directory {}: {e}", dir.display()))
        })?;
        let file = dir.join("keygate.db");

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = with_deadline(
            timeout,
            "db.connect",
            SqlitePoolOptions::new().max_connections(10).connect_with(options),
        )
        .await??;

        let store = Self { pool, timeout };
        store.init().await?;

        info!(path = %file.display(), "Credential store initialized (WAL mode)");
        Ok(store)
    }

    async fn init(&self) -> AuthResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                secret_hash TEXT PRIMARY KEY NOT NULL,
                identity TEXT NOT NULL,
                tier INTEGER NOT NULL,
                daily_limit INTEGER,
                enabled INTEGER NOT NULL DEFAULT 1,
                expires_at INTEGER,
                entitlement_expires_at INTEGER,
                revoked_at INTEGER,
                last_used_at INTEGER,
                label TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_credentials_identity ON credentials(identity)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_one_active \
             ON credentials(identity) WHERE enabled = 1 AND revoked_at IS NULL",
        )
        .execute(&self.pool)
        .await?;

        debug!("credentials table and indexes initialized");
        Ok(())
    }

    /// 在同一事务中撤销身份的全部启用记录并插入新记录
    ///
    /// 返回被撤销的条数。future 被丢弃（超时）时事务回滚，旧凭证保持可用。
    pub async fn revoke_and_insert(&self, credential: &Credential, now: i64) -> AuthResult<u64> {
        with_deadline(self.timeout, "db.revoke_and_insert", async {
            let mut tx = self.pool.begin().await?;

            let revoked = sqlx::query(
                "UPDATE credentials SET enabled = 0, revoked_at = ?1 \
                 WHERE identity = ?2 AND enabled = 1 AND revoked_at IS NULL",
            )
            .bind(now)
            .bind(&credential.identity)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            sqlx::query(
                "INSERT INTO credentials (secret_hash, identity, tier, daily_limit, enabled, \
                 expires_at, entitlement_expires_at, revoked_at, last_used_at, label, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .bind(&credential.secret_hash)
            .bind(&credential.identity)
            .bind(i64::from(credential.tier))
            .bind(credential.daily_limit.map(|l| l as i64))
            .bind(credential.enabled)
            .bind(credential.expires_at)
            .bind(credential.entitlement_expires_at)
            .bind(credential.revoked_at)
            .bind(credential.last_used_at)
            .bind(&credential.label)
            .bind(credential.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<u64, sqlx::Error>(revoked)
        })
        .await?
        .map_err(AuthError::from)
    }

    /// 按哈希查找可用凭证
    pub async fn find_usable(&self, secret_hash: &str, now: i64) -> AuthResult<Option<Credential>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM credentials WHERE secret_hash = ?1 AND {USABLE_PREDICATE}"
        );
        let row = with_deadline(
            self.timeout,
            "db.find_usable",
            sqlx::query_as::<_, CredentialRow>(&sql)
                .bind(secret_hash)
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await??;
        Ok(row.map(from_row))
    }

    /// 按哈希查找记录，不论状态
    pub async fn find(&self, secret_hash: &str) -> AuthResult<Option<Credential>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM credentials WHERE secret_hash = ?1");
        let row = with_deadline(
            self.timeout,
            "db.find",
            sqlx::query_as::<_, CredentialRow>(&sql)
                .bind(secret_hash)
                .fetch_optional(&self.pool),
        )
        .await??;
        Ok(row.map(from_row))
    }

    /// 身份名下当前可用的凭证
    pub async fn usable_for_identity(&self, identity: &str, now: i64) -> AuthResult<Vec<Credential>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM credentials WHERE identity = ?1 AND {USABLE_PREDICATE}"
        );
        let rows = with_deadline(
            self.timeout,
            "db.usable_for_identity",
            sqlx::query_as::<_, CredentialRow>(&sql)
                .bind(identity)
                .bind(now)
                .fetch_all(&self.pool),
        )
        .await??;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn touch_last_used(&self, secret_hash: &str, now: i64) -> AuthResult<()> {
        with_deadline(
            self.timeout,
            "db.touch_last_used",
            sqlx::query("UPDATE credentials SET last_used_at = ?1 WHERE secret_hash = ?2")
                .bind(now)
                .bind(secret_hash)
                .execute(&self.pool),
        )
        .await??;
        Ok(())
    }

    /// 撤销身份名下全部启用记录，返回条数
    pub async fn revoke_identity(&self, identity: &str, now: i64) -> AuthResult<u64> {
        let result = with_deadline(
            self.timeout,
            "db.revoke_identity",
            sqlx::query(
                "UPDATE credentials SET enabled = 0, revoked_at = ?1 \
                 WHERE identity = ?2 AND enabled = 1 AND revoked_at IS NULL",
            )
            .bind(now)
            .bind(identity)
            .execute(&self.pool),
        )
        .await??;
        Ok(result.rows_affected())
    }

    pub async fn ping(&self) -> AuthResult<()> {
        with_deadline(
            self.timeout,
            "db.ping",
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await??;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
