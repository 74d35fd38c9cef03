use crate::engine::EngineHandle;
use crate::protocol::{WorkerMessage, WorkerReply};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};

/// Answer one request. Every request gets exactly one reply.
pub async fn handle(engine: &EngineHandle, message: WorkerMessage) -> WorkerReply {
    match message {
        WorkerMessage::Initialize { id } => {
            tracing::info!(%id, "initialize requested");
            match engine.initialize().await {
                Ok(backend) => WorkerReply::Initialized { id, backend },
                Err(e) => {
                    tracing::warn!(%id, error = %e, "initialize failed");
                    WorkerReply::error(Some(id), e)
                }
            }
        }
        WorkerMessage::Analyze {
            id,
            image,
            landmarks,
            previous,
            gate,
        } => {
            let started = Instant::now();
            match engine.analyze(image, landmarks, previous, gate).await {
                Ok(result) => {
                    tracing::info!(
                        %id,
                        overall = result.metrics.overall_score,
                        concerns = result.metrics.concerns.len(),
                        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                        "analysis complete"
                    );
                    WorkerReply::Result {
                        id,
                        quality: result.quality,
                        metrics: result.metrics,
                    }
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "analysis failed");
                    WorkerReply::error(Some(id), e)
                }
            }
        }
    }
}

/// Serve newline-delimited JSON requests from `input` until it closes.
///
/// Replies are written as they complete and may arrive out of request order;
/// callers correlate by `id`. At most `max_in_flight` requests are held at
/// once; reading pauses until one of them is answered.
pub async fn serve<R, W>(
    engine: EngineHandle,
    input: R,
    output: W,
    max_in_flight: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WorkerReply>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(reply) = reply_rx.recv().await {
            let mut frame = serde_json::to_vec(&reply)?;
            frame.push(b'\n');
            output.write_all(&frame).await?;
            output.flush().await?;
        }
        anyhow::Ok(())
    });

    let in_flight = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WorkerMessage>(&line) {
            Ok(message) => {
                let permit = in_flight.clone().acquire_owned().await?;
                let engine = engine.clone();
                let reply_tx = reply_tx.clone();
                tokio::spawn(async move {
                    let _ = reply_tx.send(handle(&engine, message).await);
                    drop(permit);
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                let _ = reply_tx.send(WorkerReply::error(None, format!("malformed request: {e}")));
            }
        }
    }

    // In-flight handlers hold their own senders; the writer drains them before exiting.
    drop(reply_tx);
    writer.await??;
    Ok(())
}
