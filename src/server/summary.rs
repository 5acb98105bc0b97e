//! Summary endpoint: every delivered payment as one JSON array.
//!
//! The ledger only grows, so the body is streamed record by record instead
//! of being assembled in memory.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use futures::stream::unfold;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use super::AppState;
use crate::persistence::{LedgerError, LedgerRecords, stream_all};

/// Chunks buffered between the ledger reader and the response.
const STREAM_BUFFER: usize = 64;

/// Errors that can occur when reading the summary.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("failed to read ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl IntoResponse for SummaryError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Summary handler.
///
/// Returns `200` with `[` + ledger records joined by `,` + `]`. Records are
/// passed through as stored, without re-encoding. A ledger that does not
/// exist yet reads as `[]`.
///
/// A ledger that cannot be opened is a `500`. A read error after streaming
/// has started aborts the response body.
pub async fn summary_handler(
    State(app_state): State<AppState>,
) -> Result<Response, SummaryError> {
    let records = stream_all(app_state.ledger_path()).inspect_err(|e| {
        warn!(error = %e, "Failed to open ledger for summary");
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(summary_chunks(records)),
    )
        .into_response())
}

/// Yields `[`, then each record (prefixed with `,` after the first), then `]`.
///
/// Records are read on a blocking thread and handed over through a bounded
/// channel. The reader stops as soon as the receiving side is dropped.
fn summary_chunks(
    records: LedgerRecords,
) -> impl Stream<Item = Result<Bytes, LedgerError>> + Send + 'static {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);

    tokio::task::spawn_blocking(move || {
        if tx.blocking_send(Ok(Bytes::from_static(b"["))).is_err() {
            return;
        }
        for (i, record) in records.enumerate() {
            let chunk = match record {
                Ok(record) if i == 0 => Ok(Bytes::from(record)),
                Ok(record) => Ok(Bytes::from(format!(",{record}"))),
                Err(e) => {
                    warn!(error = %e, "Ledger read failed during summary");
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            if tx.blocking_send(chunk).is_err() {
                return;
            }
        }
        let _ = tx.blocking_send(Ok(Bytes::from_static(b"]")));
    });

    unfold(rx, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::path::Path;
    use tempfile::tempdir;

    async fn collect_chunks(path: &Path) -> Vec<Bytes> {
        summary_chunks(stream_all(path).unwrap())
            .map(|chunk| chunk.unwrap())
            .collect()
            .await
    }

    fn joined(chunks: &[Bytes]) -> String {
        chunks
            .iter()
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn missing_ledger_renders_empty_array() {
        let dir = tempdir().unwrap();
        let chunks = collect_chunks(&dir.path().join("summary.json")).await;
        assert_eq!(joined(&chunks), "[]");
    }

    #[tokio::test]
    async fn records_are_joined_into_an_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        std::fs::write(
            &path,
            "{\"id\":\"a\",\"amount\":\"1.00\"}\n{\"id\":\"b\",\"amount\":2}\n",
        )
        .unwrap();

        let body = joined(&collect_chunks(&path).await);

        assert_eq!(
            body,
            r#"[{"id":"a","amount":"1.00"},{"id":"b","amount":2}]"#
        );
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unterminated_tail_is_not_rendered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        std::fs::write(&path, "{\"id\":\"a\",\"amount\":1}\n{\"id\":\"b\",\"am").unwrap();

        let body = joined(&collect_chunks(&path).await);

        assert_eq!(body, r#"[{"id":"a","amount":1}]"#);
    }

    #[tokio::test]
    async fn large_ledger_is_streamed_one_record_per_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let records = 20_000;
        let ledger: String = (0..records)
            .map(|n| format!("{{\"id\":\"pay-{n}\",\"amount\":\"1.00\"}}\n"))
            .collect();
        std::fs::write(&path, ledger).unwrap();

        let chunks = collect_chunks(&path).await;

        assert_eq!(chunks.len(), records + 2);
        assert!(chunks.iter().all(|c| c.len() < 64));
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&joined(&chunks)).unwrap();
        assert_eq!(parsed.len(), records);
        assert_eq!(parsed[records - 1]["id"], "pay-19999");
    }

    #[tokio::test]
    async fn reading_stops_early_when_the_client_does() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let ledger: String = (0..1_000)
            .map(|n| format!("{{\"id\":\"p{n}\",\"amount\":1}}\n"))
            .collect();
        std::fs::write(&path, ledger).unwrap();

        let first: Vec<Bytes> = summary_chunks(stream_all(&path).unwrap())
            .take(3)
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(joined(&first), r#"[{"id":"p0","amount":1},{"id":"p1","amount":1}"#);
    }
}
