//! Domain binding repository
//!
//! The store is the only shared mutable resource in the subsystem. Domain
//! uniqueness is enforced with a unique key on `domain_name`, and status
//! transitions are conditional writes (`WHERE status = 'pending'`) so racing
//! verifiers cannot both win a transition.

use crate::domain::{DomainBinding, StringUuid};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainBindingRepository: Send + Sync {
    /// Create a pending binding with a freshly issued token.
    /// Returns `Conflict` if the domain is claimed by another tenant.
    async fn create(
        &self,
        tenant_id: StringUuid,
        domain_name: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<DomainBinding>;

    /// Find the binding owned by a tenant (at most one)
    async fn find_by_tenant(&self, tenant_id: StringUuid) -> Result<Option<DomainBinding>>;

    /// Overwrite the verification token, reset the binding to pending and
    /// clear the last error. Used for initial issuance retries and for
    /// recovering a failed binding.
    async fn reissue_token(
        &self,
        id: StringUuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<DomainBinding>;

    /// Record a verification attempt: bumps `last_checked_at` and replaces
    /// `last_error` (with `None` clearing it).
    async fn record_check<'a>(
        &self,
        id: StringUuid,
        error: Option<&'a str>,
    ) -> Result<DomainBinding>;

    /// Conditionally transition `pending -> active`, stamping
    /// `provisioned_at` on the first activation only. Returns `false` when
    /// the binding was no longer pending (a concurrent attempt won).
    async fn try_activate(&self, id: StringUuid) -> Result<bool>;

    /// Conditionally transition `pending -> failed` with a diagnostic.
    /// Returns `false` when the binding was no longer pending.
    async fn mark_failed(&self, id: StringUuid, error: &str) -> Result<bool>;

    /// Remove the binding, releasing the domain name claim
    async fn delete(&self, id: StringUuid) -> Result<()>;

    /// Pending bindings not checked since `checked_before`, oldest first.
    /// Used by the background sweep.
    async fn list_pending(
        &self,
        checked_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DomainBinding>>;
}

const BINDING_COLUMNS: &str = "id, tenant_id, domain_name, status, verification_token, \
     verification_expiry, provisioned_at, last_checked_at, last_error, created_at, updated_at";

pub struct DomainBindingRepositoryImpl {
    pool: MySqlPool,
}

impl DomainBindingRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<DomainBinding>> {
        let binding = sqlx::query_as::<_, DomainBinding>(&format!(
            "SELECT {BINDING_COLUMNS} FROM domain_bindings WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(binding)
    }
}

#[async_trait]
impl DomainBindingRepository for DomainBindingRepositoryImpl {
    async fn create(
        &self,
        tenant_id: StringUuid,
        domain_name: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<DomainBinding> {
        let id = StringUuid::new_v4();

        let result = sqlx::query(
            r#"
            INSERT INTO domain_bindings
                (id, tenant_id, domain_name, status, verification_token, verification_expiry, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?, NOW(6), NOW(6))
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(domain_name)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    return Err(AppError::Conflict(format!(
                        "Domain {} is already claimed",
                        domain_name
                    )));
                }
                return Err(e.into());
            }
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create domain binding")))
    }

    async fn find_by_tenant(&self, tenant_id: StringUuid) -> Result<Option<DomainBinding>> {
        let binding = sqlx::query_as::<_, DomainBinding>(&format!(
            "SELECT {BINDING_COLUMNS} FROM domain_bindings WHERE tenant_id = ?"
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(binding)
    }

    async fn reissue_token(
        &self,
        id: StringUuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<DomainBinding> {
        sqlx::query(
            r#"
            UPDATE domain_bindings
            SET status = 'pending', verification_token = ?, verification_expiry = ?,
                last_error = NULL, updated_at = NOW(6)
            WHERE id = ?
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Domain binding {} not found", id)))
    }

    async fn record_check<'a>(
        &self,
        id: StringUuid,
        error: Option<&'a str>,
    ) -> Result<DomainBinding> {
        sqlx::query(
            r#"
            UPDATE domain_bindings
            SET last_checked_at = NOW(6), last_error = ?, updated_at = NOW(6)
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Domain binding {} not found", id)))
    }

    async fn try_activate(&self, id: StringUuid) -> Result<bool> {
        // provisioned_at is stamped on the first activation only and is
        // preserved across later re-issuance cycles.
        let result = sqlx::query(
            r#"
            UPDATE domain_bindings
            SET status = 'active',
                provisioned_at = COALESCE(provisioned_at, NOW(6)),
                last_checked_at = NOW(6),
                last_error = NULL,
                updated_at = NOW(6)
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: StringUuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE domain_bindings
            SET status = 'failed', last_error = ?, last_checked_at = NOW(6), updated_at = NOW(6)
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: StringUuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM domain_bindings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Domain binding {} not found",
                id
            )));
        }

        Ok(())
    }

    async fn list_pending(
        &self,
        checked_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DomainBinding>> {
        let bindings = sqlx::query_as::<_, DomainBinding>(&format!(
            r#"
            SELECT {BINDING_COLUMNS} FROM domain_bindings
            WHERE status = 'pending'
              AND (last_checked_at IS NULL OR last_checked_at <= ?)
            ORDER BY last_checked_at IS NULL DESC, last_checked_at ASC
            LIMIT ?
            "#
        ))
        .bind(checked_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    #[tokio::test]
    async fn test_mock_find_by_tenant() {
        let mut mock = MockDomainBindingRepository::new();
        let tenant_id = StringUuid::new_v4();

        mock.expect_find_by_tenant()
            .with(eq(tenant_id))
            .returning(move |tid| {
                Ok(Some(DomainBinding {
                    tenant_id: tid,
                    domain_name: "shop.example.com".to_string(),
                    ..Default::default()
                }))
            });

        let result = mock.find_by_tenant(tenant_id).await.unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().domain_name, "shop.example.com");
    }

    #[tokio::test]
    async fn test_mock_find_by_tenant_not_found() {
        let mut mock = MockDomainBindingRepository::new();

        mock.expect_find_by_tenant().returning(|_| Ok(None));

        let result = mock.find_by_tenant(StringUuid::new_v4()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_mock_create_conflict() {
        let mut mock = MockDomainBindingRepository::new();

        mock.expect_create().returning(|_, domain, _, _| {
            Err(AppError::Conflict(format!(
                "Domain {} is already claimed",
                domain
            )))
        });

        let result = mock
            .create(
                StringUuid::new_v4(),
                "shop.example.com",
                "abc123",
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_mock_try_activate_race_loser() {
        let mut mock = MockDomainBindingRepository::new();
        let id = StringUuid::new_v4();

        mock.expect_try_activate()
            .with(eq(id))
            .returning(|_| Ok(false));

        let won = mock.try_activate(id).await.unwrap();
        assert!(!won);
    }

    #[tokio::test]
    async fn test_mock_record_check_clears_error() {
        let mut mock = MockDomainBindingRepository::new();
        let id = StringUuid::new_v4();

        mock.expect_record_check()
            .withf(|_, error| error.is_none())
            .returning(move |rid, _| {
                Ok(DomainBinding {
                    id: rid,
                    last_error: None,
                    last_checked_at: Some(Utc::now()),
                    ..Default::default()
                })
            });

        let binding = mock.record_check(id, None).await.unwrap();
        assert!(binding.last_error.is_none());
        assert!(binding.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_mock_list_pending() {
        let mut mock = MockDomainBindingRepository::new();

        mock.expect_list_pending().returning(|_, _| {
            Ok(vec![
                DomainBinding {
                    domain_name: "a.example.com".to_string(),
                    ..Default::default()
                },
                DomainBinding {
                    domain_name: "b.example.com".to_string(),
                    ..Default::default()
                },
            ])
        });

        let result = mock.list_pending(Utc::now(), 50).await.unwrap();
        assert_eq!(result.len(), 2);
    }
}
