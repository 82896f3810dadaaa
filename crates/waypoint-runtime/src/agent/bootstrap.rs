use std::sync::Arc;

use waypoint_core::{
    parse_snapshot, BoxFuture, DirectoryRequest, MembershipSet, Phase, Result, WaypointError,
};

use super::DiscoveryAgent;

/// Which branch a bootstrap took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetOutcome {
    /// This agent held the fetch lock and read the directory.
    Fetched(usize),
    /// Another agent fetched; the cached membership was delivered.
    Cached(usize),
    /// Nothing cached yet; `get` will run again after the loop time.
    Rescheduled,
}

impl DiscoveryAgent {
    /// Bootstrap the membership of the service.
    ///
    /// The fetch lock holder reads the directory, stores the result and
    /// populates the sink. Everyone else populates from the cache, or
    /// retries once the holder has filled it. Errors from the fetch are
    /// returned to the caller.
    pub fn get(self: &Arc<Self>) -> BoxFuture<'static, Result<GetOutcome>> {
        let agent = self.clone();
        Box::pin(async move { agent.bootstrap().await })
    }

    async fn bootstrap(self: Arc<Self>) -> Result<GetOutcome> {
        if self.is_stopped() {
            return Err(WaypointError::Shutdown);
        }

        if self.store.try_acquire_fetch_lock(&self.service).await? {
            let members = self.fetch_from_directory().await?;
            return Ok(GetOutcome::Fetched(members.len()));
        }

        match self.store.get_membership(&self.service).await? {
            Some(members) => {
                tracing::debug!(
                    agent = %self.id,
                    service = %self.service,
                    endpoints = members.len(),
                    "Populating from cached membership"
                );
                self.sink.populate(&self.service, &members).await?;
                Ok(GetOutcome::Cached(members.len()))
            }
            None => {
                self.reschedule(Phase::Get);
                Ok(GetOutcome::Rescheduled)
            }
        }
    }

    async fn fetch_from_directory(&self) -> Result<MembershipSet> {
        let request = DirectoryRequest::fetch(&self.config.get, &self.service);
        let raw = self.transport.fetch(request).await?.ok_or_else(|| {
            WaypointError::MalformedDirectory(format!(
                "Empty directory response for {}",
                self.service
            ))
        })?;

        let members = parse_snapshot(&raw)?;
        self.store.set_membership(&self.service, &members).await?;
        self.sink.populate(&self.service, &members).await?;

        tracing::info!(
            agent = %self.id,
            service = %self.service,
            endpoints = members.len(),
            "Fetched membership from directory"
        );
        Ok(members)
    }
}
