//! Repository commands (`repo/*`).

use crate::client::KuboClient;
use crate::error::KuboError;
use crate::models::RepoStat;

/// Commands on the daemon's repository.
pub struct RepoResource<'c> {
    client: &'c KuboClient,
}

impl<'c> RepoResource<'c> {
    pub(crate) fn new(client: &'c KuboClient) -> Self {
        Self { client }
    }

    /// Repository usage statistics.
    pub async fn stat(&self) -> Result<RepoStat, KuboError> {
        let request = self.client.post("repo/stat");
        self.client.json(request).await
    }
}
