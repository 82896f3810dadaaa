use std::sync::{Arc, RwLock};

use crate::agent::{BoxFuture, ConnectionSink};
use crate::membership::{MembershipSet, ServiceName};
use crate::Result;

/// A recorded sink notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    /// `populate` with the full set.
    Populate(ServiceName, MembershipSet),
    /// `remove_endpoints` with the offline set.
    Remove(ServiceName, MembershipSet),
    /// `add_endpoints` with the online set.
    Add(ServiceName, MembershipSet),
}

/// Connection sink that records every notification.
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<RwLock<Vec<SinkCall>>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls in arrival order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.read().unwrap().clone()
    }

    /// Sets passed to `populate`.
    pub fn populated(&self) -> Vec<MembershipSet> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Populate(_, set) => Some(set),
                _ => None,
            })
            .collect()
    }

    /// Sets passed to `remove_endpoints`.
    pub fn removed(&self) -> Vec<MembershipSet> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Remove(_, set) => Some(set),
                _ => None,
            })
            .collect()
    }

    /// Sets passed to `add_endpoints`.
    pub fn added(&self) -> Vec<MembershipSet> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Add(_, set) => Some(set),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SinkCall) {
        self.calls.write().unwrap().push(call);
    }
}

impl ConnectionSink for RecordingSink {
    fn populate<'a>(
        &'a self,
        service: &'a ServiceName,
        members: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>> {
        self.record(SinkCall::Populate(service.clone(), members.clone()));
        Box::pin(async { Ok(()) })
    }

    fn remove_endpoints<'a>(
        &'a self,
        service: &'a ServiceName,
        offline: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>> {
        self.record(SinkCall::Remove(service.clone(), offline.clone()));
        Box::pin(async { Ok(()) })
    }

    fn add_endpoints<'a>(
        &'a self,
        service: &'a ServiceName,
        online: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>> {
        self.record(SinkCall::Add(service.clone(), online.clone()));
        Box::pin(async { Ok(()) })
    }
}
