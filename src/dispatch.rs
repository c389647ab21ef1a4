use futures_util::TryStreamExt;

use crate::binder::BoundRequest;
use crate::driver::{Driver, RawDriverResult, StreamEvent, StreamSummary};
use crate::error::{DriverError, SqlTxnError};
use crate::results::{CustomDbRow, NormalizedResult, Recordset, normalize};

/// Execute a bound request on `conn` and normalize what comes back.
///
/// With `streaming` set, rows are collected from [`Driver::execute_stream`] and
/// regrouped into recordsets using the per-statement counts of the final
/// summary; otherwise the driver materializes the result itself.
///
/// # Errors
/// Returns `ExecutionFailed` when the driver rejects the call, the row stream
/// yields an error, or the stream ends without a completion summary.
pub async fn dispatch<D: Driver + ?Sized>(
    driver: &D,
    conn: &mut D::Connection,
    request: &BoundRequest,
    streaming: bool,
) -> Result<NormalizedResult, SqlTxnError> {
    tracing::debug!(
        mode = ?request.mode,
        streaming,
        inputs = request.inputs.len(),
        outputs = request.outputs.len(),
        "dispatching request"
    );

    let raw = if streaming {
        collect_stream(driver, conn, request).await?
    } else {
        driver
            .execute(conn, request)
            .await
            .map_err(SqlTxnError::ExecutionFailed)?
    };

    Ok(normalize(raw))
}

async fn collect_stream<D: Driver + ?Sized>(
    driver: &D,
    conn: &mut D::Connection,
    request: &BoundRequest,
) -> Result<RawDriverResult, SqlTxnError> {
    let mut stream = driver
        .execute_stream(conn, request)
        .await
        .map_err(SqlTxnError::ExecutionFailed)?;

    let mut rows: Vec<CustomDbRow> = Vec::new();
    let mut summary: Option<StreamSummary> = None;
    while let Some(event) = stream
        .try_next()
        .await
        .map_err(SqlTxnError::ExecutionFailed)?
    {
        match event {
            StreamEvent::Row(row) => rows.push(row),
            StreamEvent::Done(done) => {
                summary = Some(done);
                break;
            }
        }
    }

    let summary = summary.ok_or_else(|| {
        SqlTxnError::ExecutionFailed(DriverError::ExecutionError(
            "row stream ended without a completion summary".to_string(),
        ))
    })?;

    let total = rows.len() as u64;
    let (recordsets, rows_affected) = match summary.rows_affected {
        Some(manifest) => (partition_rows(rows, &manifest), manifest),
        None => (vec![rows], vec![total]),
    };

    Ok(RawDriverResult {
        recordsets,
        rows_affected,
        output: summary.output,
        return_value: summary.return_value,
    })
}

/// Split streamed rows into consecutive recordsets whose lengths follow
/// `manifest`.
///
/// An entry larger than what is left takes the remainder. Rows beyond the
/// manifest total are kept as one extra trailing recordset.
#[must_use]
pub fn partition_rows(rows: Vec<CustomDbRow>, manifest: &[u64]) -> Vec<Recordset> {
    let mut remaining = rows.into_iter();
    let mut recordsets: Vec<Recordset> = manifest
        .iter()
        .map(|count| {
            let take = usize::try_from(*count).unwrap_or(usize::MAX);
            remaining.by_ref().take(take).collect()
        })
        .collect();

    let leftover: Recordset = remaining.collect();
    if !leftover.is_empty() {
        tracing::warn!(
            extra_rows = leftover.len(),
            "row stream produced more rows than its per-statement counts"
        );
        recordsets.push(leftover);
    }
    recordsets
}
