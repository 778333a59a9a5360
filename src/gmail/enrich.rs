//! Message listing enrichment
//!
//! A message listing only carries ids. Each listed message is fetched with `format=metadata`
//! concurrently and turned into a [`MessageSummary`]; summaries come back in listing order.

use futures::stream::{self, StreamExt};
use reqwest::Method;
use serde_json::Value;

use crate::error::GmailApiError;
use crate::gmail::client::{ApiRequest, MailboxApi};
use crate::gmail::types::{MessageMetadata, MessageRef, MessageSummary};
use crate::gmail::utils::find_header;

/// Subject shown for messages without one
pub const NO_SUBJECT: &str = "(No Subject)";

/// Most detail requests in flight at once for one listing
pub const MAX_CONCURRENT_FETCHES: usize = 40;

/// Ids of the messages in a listing response, in listing order
pub fn listed_refs(listing: &Value) -> Result<Vec<MessageRef>, GmailApiError> {
    match listing.get("messages") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(messages) => serde_json::from_value(messages.clone()).map_err(|e| {
            GmailApiError::MalformedResponse {
                message: format!("message listing: {}", e),
            }
        }),
    }
}

/// Build a summary row from a metadata response
pub fn summarize(metadata: &MessageMetadata) -> MessageSummary {
    let header = |name: &str| {
        metadata
            .payload
            .as_ref()
            .and_then(|payload| find_header(payload, name))
            .map(str::to_string)
    };

    MessageSummary {
        id: metadata.id.clone(),
        thread_id: metadata.thread_id.clone().unwrap_or_default(),
        subject: header("subject").unwrap_or_else(|| NO_SUBJECT.to_string()),
        from: header("from").unwrap_or_default(),
        date: header("date").unwrap_or_default(),
        snippet: metadata.snippet.clone().unwrap_or_default(),
    }
}

/// Fetch metadata for every listed message and summarize it, preserving listing order
///
/// At most [`MAX_CONCURRENT_FETCHES`] requests run at once. Any failed detail request fails
/// the whole enrichment.
pub async fn enrich_messages(
    api: &dyn MailboxApi,
    bearer_token: &str,
    refs: &[MessageRef],
) -> Result<Vec<MessageSummary>, GmailApiError> {
    let fetches: Vec<_> = refs
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let request = ApiRequest::new(
                Method::GET,
                format!("messages/{}", urlencoding::encode(&message.id)),
                bearer_token,
            )
            .with_query(vec![("format".to_string(), "metadata".to_string())]);
            async move { (index, api.call(request).await) }
        })
        .collect();
    let mut pending = stream::iter(fetches).buffer_unordered(MAX_CONCURRENT_FETCHES);

    let mut slots: Vec<Option<MessageSummary>> = vec![None; refs.len()];
    while let Some((index, response)) = pending.next().await {
        let metadata: MessageMetadata =
            serde_json::from_value(response?).map_err(|e| GmailApiError::MalformedResponse {
                message: format!("message metadata: {}", e),
            })?;
        slots[index] = Some(summarize(&metadata));
    }

    tracing::debug!("Enriched {} listed messages", slots.len());
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::client::MockMailboxApi;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn metadata_response(id: &str, subject: Option<&str>) -> Value {
        let mut headers = vec![
            json!({"name": "From", "value": "Ann <ann@example.com>"}),
            json!({"name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 +0000"}),
        ];
        if let Some(subject) = subject {
            headers.push(json!({"name": "subject", "value": subject}));
        }
        json!({
            "id": id,
            "threadId": format!("t-{}", id),
            "snippet": format!("preview {}", id),
            "payload": {"mimeType": "text/plain", "headers": headers}
        })
    }

    #[test]
    fn test_listed_refs() {
        let listing = json!({"messages": [{"id": "a", "threadId": "ta"}, {"id": "b"}]});
        let refs = listed_refs(&listing).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].id, "b");
        assert!(listed_refs(&json!({"resultSizeEstimate": 0})).unwrap().is_empty());
        assert!(listed_refs(&json!({"messages": "nope"})).is_err());
    }

    #[test]
    fn test_summarize_defaults() {
        let metadata: MessageMetadata = serde_json::from_value(json!({"id": "m1"})).unwrap();
        let summary = summarize(&metadata);
        assert_eq!(summary.subject, NO_SUBJECT);
        assert_eq!(summary.from, "");
        assert_eq!(summary.date, "");
        assert_eq!(summary.snippet, "");
    }

    #[tokio::test]
    async fn test_enrich_messages() {
        let mut api = MockMailboxApi::new();
        api.expect_call()
            .withf(|request| {
                request.method == Method::GET
                    && request.bearer_token == "tok"
                    && request.query == vec![("format".to_string(), "metadata".to_string())]
            })
            .times(2)
            .returning(|request| {
                let id = request.path.trim_start_matches("messages/").to_string();
                let subject = if id == "m1" { Some("Hello") } else { None };
                Ok(metadata_response(&id, subject))
            });

        let refs = listed_refs(&json!({"messages": [{"id": "m1"}, {"id": "m2"}]})).unwrap();
        let summaries = enrich_messages(&api, "tok", &refs).await.unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].subject, "Hello");
        assert_eq!(summaries[0].from, "Ann <ann@example.com>");
        assert_eq!(summaries[0].thread_id, "t-m1");
        assert_eq!(summaries[1].subject, NO_SUBJECT);
        assert_eq!(summaries[1].snippet, "preview m2");
    }

    struct InFlightCounter {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MailboxApi for InFlightCounter {
        async fn call(&self, request: ApiRequest) -> Result<Value, GmailApiError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            let id = request.path.trim_start_matches("messages/").to_string();
            Ok(metadata_response(&id, Some(&id)))
        }
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let api = InFlightCounter {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let refs: Vec<MessageRef> = (0..200)
            .map(|i| MessageRef {
                id: format!("m{}", i),
                thread_id: String::new(),
            })
            .collect();

        let summaries = enrich_messages(&api, "tok", &refs).await.unwrap();

        assert_eq!(summaries.len(), 200);
        assert_eq!(summaries[0].subject, "m0");
        assert_eq!(summaries[199].subject, "m199");
        let peak = api.peak.load(Ordering::SeqCst);
        assert!(peak <= MAX_CONCURRENT_FETCHES, "peak {}", peak);
        assert!(peak > 1);
    }

    #[tokio::test]
    async fn test_failed_detail_fails_enrichment() {
        let mut api = MockMailboxApi::new();
        api.expect_call().returning(|request| {
            if request.path == "messages/bad" {
                Err(GmailApiError::Remote {
                    status: 404,
                    message: Some("Requested entity was not found.".to_string()),
                })
            } else {
                Ok(metadata_response("ok", Some("s")))
            }
        });

        let refs = listed_refs(&json!({"messages": [{"id": "ok"}, {"id": "bad"}]})).unwrap();
        let err = enrich_messages(&api, "tok", &refs).await.unwrap_err();
        assert_eq!(err.remote_message(), Some("Requested entity was not found."));
    }
}
