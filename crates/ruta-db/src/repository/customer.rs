//! # Customer Repository
//!
//! Customers the agent sells to. Remote-owned.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use ruta_core::CustomerRecord;

const CUSTOMER_COLUMNS: &str = "id, name, company_name, email, phone, address, city, state, \
     client_number, contact_person, price_tier, assigned_agent_id, status, is_active, updated_at";

/// Repository for customers.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Inserts or replaces customers by id, in one transaction.
    pub async fn upsert_batch(&self, customers: &[CustomerRecord]) -> DbResult<usize> {
        if customers.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for c in customers {
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO customers ({CUSTOMER_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&c.id)
            .bind(&c.name)
            .bind(&c.company_name)
            .bind(&c.email)
            .bind(&c.phone)
            .bind(&c.address)
            .bind(&c.city)
            .bind(&c.state)
            .bind(&c.client_number)
            .bind(&c.contact_person)
            .bind(c.price_tier)
            .bind(&c.assigned_agent_id)
            .bind(&c.status)
            .bind(c.is_active)
            .bind(c.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = customers.len(), "Customers upserted");
        Ok(customers.len())
    }

    /// Active customers ordered by company name, then contact name.
    pub async fn list(&self) -> DbResult<Vec<CustomerRecord>> {
        let customers = sqlx::query_as::<_, CustomerRecord>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE is_active = 1 \
             ORDER BY COALESCE(company_name, name) COLLATE NOCASE ASC, name COLLATE NOCASE ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Gets a customer by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CustomerRecord>> {
        let customer = sqlx::query_as::<_, CustomerRecord>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Counts active customers (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use ruta_core::PriceTier;

    fn customer(id: &str, company: Option<&str>, name: &str) -> CustomerRecord {
        CustomerRecord {
            id: id.to_string(),
            name: Some(name.to_string()),
            company_name: company.map(str::to_string),
            email: None,
            phone: None,
            address: None,
            city: Some("Rosario".to_string()),
            state: None,
            client_number: None,
            contact_person: None,
            price_tier: PriceTier::Interior,
            assigned_agent_id: Some("agent-1".to_string()),
            status: "active".to_string(),
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_list_ordered_by_company_then_name() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        repo.upsert_batch(&[
            customer("c-1", Some("Zapateria Sur"), "Ana"),
            customer("c-2", None, "Bruno"),
            customer("c-3", Some("Almacen Norte"), "Carla"),
        ])
        .await
        .unwrap();

        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c-3", "c-2", "c-1"]);

        let stored = repo.get_by_id("c-1").await.unwrap().unwrap();
        assert_eq!(stored.price_tier, PriceTier::Interior);
        assert_eq!(stored.display_name(), "Zapateria Sur");
    }
}
