//! Address persistence seam

use async_trait::async_trait;

use crate::cluster::ClientError;

use super::model::Address;

#[async_trait]
pub trait AddressApi: Send + Sync {
    /// All addresses of one tenant, including those marked for deletion
    async fn list_addresses(&self, namespace: &str) -> Result<Vec<Address>, ClientError>;

    /// Replace the stored copy of an address (metadata and status)
    async fn replace_address(&self, address: &Address) -> Result<(), ClientError>;
}
