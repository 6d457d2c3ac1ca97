use crate::persistence::{UsageRecord, UsageRepository};
use crate::shared::clock::now_rfc3339;
use tracing::warn;

/// Best-effort prompt usage trail. Recording failures are logged and
/// swallowed so auditing never blocks phase execution.
pub struct UsageAudit {
    usage: UsageRepository,
}

impl UsageAudit {
    pub fn new(usage: UsageRepository) -> Self {
        Self { usage }
    }

    /// Returns `true` when the usage row was written. A persistence failure
    /// emits one structured warning carrying every identifying field and
    /// returns `false`.
    pub fn record(
        &self,
        pipeline_id: &str,
        prompt_id: &str,
        role_name: &str,
        phase_name: &str,
    ) -> bool {
        let record = UsageRecord {
            pipeline_id: pipeline_id.to_string(),
            prompt_id: prompt_id.to_string(),
            role_name: role_name.to_string(),
            phase_name: phase_name.to_string(),
            used_at: now_rfc3339(),
        };
        match self.usage.insert(&record) {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    pipeline_id,
                    prompt_id,
                    role_name,
                    phase_name,
                    error = %error,
                    "failed to record prompt usage"
                );
                false
            }
        }
    }
}
