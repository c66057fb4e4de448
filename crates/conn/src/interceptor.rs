//! Request interceptor that stamps dial-option metadata onto outgoing calls.

use std::sync::Arc;

use tonic::service::Interceptor;

use crate::options::{DialSettings, MetadataEntry};

/// Inserts every `DialOption::Metadata` entry of a channel into each request.
///
/// Later entries with the same key replace earlier ones, matching how the
/// remaining options override each other.
#[derive(Debug, Clone, Default)]
pub struct MetadataInterceptor {
    entries: Arc<[MetadataEntry]>,
}

impl MetadataInterceptor {
    /// Collects the metadata entries of the given settings.
    pub fn new(settings: &DialSettings) -> Self {
        Self { entries: settings.metadata().cloned().collect() }
    }

    /// Returns true when no metadata is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Interceptor for MetadataInterceptor {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> Result<tonic::Request<()>, tonic::Status> {
        let metadata = request.metadata_mut();
        for entry in self.entries.iter() {
            metadata.insert(entry.key().clone(), entry.value().clone());
        }
        Ok(request)
    }
}
