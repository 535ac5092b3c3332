//! Response envelope metadata for the data-exchange protocol.
//!
//! A success envelope carries `result` (an arbitrary object, with an
//! array-valued `data` member on paginated endpoints) and `metadata` with
//! optional pagination and asynchronous-job blocks.

use serde::Deserialize;
use serde_json::Value;

/// Job status a server reports once an asynchronous job is done.
pub const JOB_FINISHED: &str = "FINISHED";

/// Pagination block of a response envelope.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Total number of pages the server reports for the query.
    #[serde(default = "default_total_pages")]
    pub total_pages: u64,
}

fn default_total_pages() -> u64 {
    1
}

/// Asynchronous-job block of a response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AsynchStatus {
    /// Current job status; anything but [`JOB_FINISHED`] means pending.
    pub status: String,
    /// Identifier to poll the job's status URL with.
    pub asynch_id: String,
}

/// Metadata block of a response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metadata {
    /// Pagination details, present on paginated endpoints.
    pub pagination: Option<Pagination>,
    /// Asynchronous-job status, present on job-backed endpoints.
    pub asynch_status: Option<AsynchStatus>,
}

impl Metadata {
    /// Parses the `metadata` member of an envelope, tolerating absence and
    /// unknown members.
    #[must_use]
    pub fn from_envelope(envelope: &Value) -> Self {
        envelope
            .get("metadata")
            .cloned()
            .and_then(|metadata| serde_json::from_value(metadata).ok())
            .unwrap_or_default()
    }

    /// The pending job id, when the envelope reports an unfinished job.
    #[must_use]
    pub fn pending_job(&self) -> Option<&str> {
        self.asynch_status
            .as_ref()
            .filter(|status| status.status != JOB_FINISHED)
            .map(|status| status.asynch_id.as_str())
    }

    /// Pages the server reports in total, defaulting to a single page when
    /// the pagination block is absent.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.pagination.map_or(1, |pagination| pagination.total_pages)
    }
}

/// Attaches the originating envelope to an item as its `__response`
/// back-reference. JSON values are trees, not graphs, so the reference is
/// the envelope with its `result` payload removed.
pub(crate) fn attach_back_reference(datum: &mut Value, envelope: &Value) {
    if let Value::Object(map) = datum {
        let mut response = serde_json::Map::new();
        if let Some(metadata) = envelope.get("metadata") {
            response.insert("metadata".to_string(), metadata.clone());
        }
        map.insert("__response".to_string(), Value::Object(response));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_parses_pagination() {
        let envelope = json!({
            "metadata": {"pagination": {"totalPages": 3, "currentPage": 0}},
            "result": {"data": []},
        });
        let metadata = Metadata::from_envelope(&envelope);
        assert_eq!(metadata.total_pages(), 3);
        assert_eq!(metadata.pending_job(), None);
    }

    #[test]
    fn test_metadata_defaults_when_absent() {
        let metadata = Metadata::from_envelope(&json!({"result": {}}));
        assert_eq!(metadata.total_pages(), 1);
        assert!(metadata.pagination.is_none());
    }

    #[test]
    fn test_pending_job_only_before_finished() {
        let pending = Metadata::from_envelope(&json!({
            "metadata": {"asynchStatus": {"status": "INPROCESS", "asynchId": "job-9"}},
        }));
        assert_eq!(pending.pending_job(), Some("job-9"));

        let finished = Metadata::from_envelope(&json!({
            "metadata": {"asynchStatus": {"status": "FINISHED", "asynchId": "job-9"}},
        }));
        assert_eq!(finished.pending_job(), None);
    }

    #[test]
    fn test_back_reference_carries_metadata_only() {
        let envelope = json!({
            "metadata": {"pagination": {"totalPages": 2}},
            "result": {"data": [{"id": 1}]},
        });
        let mut item = json!({"id": 1});
        attach_back_reference(&mut item, &envelope);
        assert_eq!(
            item["__response"],
            json!({"metadata": {"pagination": {"totalPages": 2}}})
        );
        assert!(item["__response"].get("result").is_none());
    }

    #[test]
    fn test_back_reference_skips_non_objects() {
        let mut item = json!("scalar");
        attach_back_reference(&mut item, &json!({"metadata": {}}));
        assert_eq!(item, json!("scalar"));
    }
}
