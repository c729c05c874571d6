//! Customer Lookup

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Customer account details used to pre-fill shipping
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub username: String,
    pub company_name: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Customer lookup by login name
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer_by_username(&self, username: &str) -> Result<Option<Customer>>;
}

/// In-memory customer directory (for development)
pub struct MemoryCustomerDirectory {
    customers: RwLock<HashMap<String, Customer>>,
}

impl Default for MemoryCustomerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCustomerDirectory {
    pub fn new() -> Self {
        Self {
            customers: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, customer: Customer) -> Result<()> {
        let mut customers = self
            .customers
            .write()
            .map_err(|_| CheckoutError::Storage("customer directory lock poisoned".into()))?;
        customers.insert(customer.username.clone(), customer);
        Ok(())
    }
}

#[async_trait]
impl CustomerDirectory for MemoryCustomerDirectory {
    async fn customer_by_username(&self, username: &str) -> Result<Option<Customer>> {
        let customers = self
            .customers
            .read()
            .map_err(|_| CheckoutError::Storage("customer directory lock poisoned".into()))?;
        Ok(customers.get(username).cloned())
    }
}
