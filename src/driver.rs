//! Async driver – ticks the engine and serves JSON-lines requests.
//!
//! ## Request loop
//!
//! One [`GateRequest`] per input line, one [`GateResponse`] per output line.
//! Malformed lines are answered with an `error` response and skipped.
//!
//! ## Tick loop
//!
//! A Tokio interval calls [`GateEngine::tick`] at the configured rate. The
//! engine lock is held only for the duration of one tick or one request,
//! never across an `.await`.
//!
//! ## Shutdown
//!
//! SIGINT or a `shutdown` request settles in-flight swings and writes every
//! gate before the driver returns.

use crate::engine::GateEngine;
use crate::protocol::{dispatch, GateRequest, GateResponse};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// How a request stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The reader reached end of input.
    Closed,
    /// A `shutdown` request was served; the engine is already empty.
    Shutdown,
}

/// Read requests from `reader` until it closes or asks for shutdown.
pub async fn serve_requests<R, W>(
    engine: &Mutex<GateEngine>,
    reader: R,
    mut writer: W,
) -> Result<StreamEnd>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read request line")?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (response, end) = match serde_json::from_str::<GateRequest>(line) {
            Ok(request) => {
                let shutdown = matches!(request, GateRequest::Shutdown);
                let response = dispatch(&mut engine.lock(), request);
                (response, shutdown)
            }
            Err(e) => {
                debug!("Rejected malformed request: {}", e);
                (
                    GateResponse::Error {
                        message: format!("Invalid request: {}", e),
                    },
                    false,
                )
            }
        };

        let mut out = serde_json::to_vec(&response).context("Failed to serialise response")?;
        out.push(b'\n');
        writer
            .write_all(&out)
            .await
            .context("Failed to write response")?;
        writer.flush().await.context("Failed to flush response")?;

        if end {
            return Ok(StreamEnd::Shutdown);
        }
    }
    Ok(StreamEnd::Closed)
}

// ---------------------------------------------------------------------------
// GateDriver
// ---------------------------------------------------------------------------

/// Owns the tick loop around a shared [`GateEngine`].
pub struct GateDriver {
    engine: Arc<Mutex<GateEngine>>,
    tick_rate_hz: f32,
}

impl GateDriver {
    pub fn new(engine: Arc<Mutex<GateEngine>>, tick_rate_hz: f32) -> Self {
        Self {
            engine,
            tick_rate_hz,
        }
    }

    pub fn engine(&self) -> &Arc<Mutex<GateEngine>> {
        &self.engine
    }

    /// Run until SIGINT or a `shutdown` request, serving `reader`/`writer`.
    pub async fn run<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let tick_rate = if self.tick_rate_hz > 0.0 {
            self.tick_rate_hz
        } else {
            warn!("Invalid tick rate {}, using 20Hz", self.tick_rate_hz);
            20.0
        };
        info!("GateDriver active – ticking at {:.0}Hz", tick_rate);

        let engine_tick = self.engine.clone();
        let tick_handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(Duration::from_secs_f32(1.0 / tick_rate));
            loop {
                timer.tick().await;
                let events = engine_tick.lock().tick();
                for removed in &events.removed {
                    warn!(gate = %removed.gate_id, "gate removed during tick: {:?}", removed.reason);
                }
                if !events.is_quiet() {
                    debug!(
                        tick = events.tick,
                        moving = events.moving,
                        committed = events.committed.len(),
                        saved = events.saved,
                        "tick"
                    );
                }
            }
        });

        let requests = serve_requests(&self.engine, reader, writer);
        tokio::pin!(requests);

        let already_shut_down = tokio::select! {
            served = &mut requests => match served {
                Ok(StreamEnd::Shutdown) => {
                    info!("GateDriver shutting down (request)");
                    true
                }
                Ok(StreamEnd::Closed) => {
                    info!("Request stream closed; waiting for SIGINT");
                    wait_for_sigint().await;
                    false
                }
                Err(e) => {
                    error!("Request loop failed: {:#}", e);
                    false
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("GateDriver shutting down (SIGINT)");
                false
            }
        };

        tick_handle.abort();
        if !already_shut_down {
            let saved = self.engine.lock().shutdown();
            info!("Saved {} gates", saved);
        }
        Ok(())
    }
}

async fn wait_for_sigint() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for SIGINT: {}", e);
    }
}
