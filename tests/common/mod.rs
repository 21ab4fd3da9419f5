#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use qrscan::{DecodeError, Decoder, Frame, FrameData, FrameFormat, Rotation, Symbol};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use url::Url;

pub type DecodeOutcome = Result<Vec<Symbol>, DecodeError>;

// ============================================================================
// Decoders
// ============================================================================

/// Decoder whose result for each frame is supplied by the test, in any order
#[derive(Default)]
pub struct ScriptedDecoder {
    gates: Mutex<HashMap<u64, oneshot::Receiver<DecodeOutcome>>>,
}

impl ScriptedDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register frame `id`; its decode finishes when the returned sender fires
    pub fn gate(&self, id: u64) -> oneshot::Sender<DecodeOutcome> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(id, rx);
        tx
    }
}

#[async_trait]
impl Decoder for ScriptedDecoder {
    async fn decode(&self, frame: &FrameData) -> Result<Vec<Symbol>, DecodeError> {
        let gate = self.gates.lock().remove(&frame.id);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(DecodeError::failed(frame.id, "gate dropped"))),
            None => Ok(Vec::new()),
        }
    }
}

/// Decoder that holds every frame until opened, then reports one QR code
pub struct HeldDecoder {
    open: watch::Receiver<bool>,
    text: String,
}

impl HeldDecoder {
    pub fn new(text: &str) -> (Arc<Self>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Arc::new(Self {
                open: rx,
                text: text.to_string(),
            }),
            tx,
        )
    }
}

#[async_trait]
impl Decoder for HeldDecoder {
    async fn decode(&self, frame: &FrameData) -> Result<Vec<Symbol>, DecodeError> {
        let mut open = self.open.clone();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| DecodeError::failed(frame.id, "gate closed"))?;
        Ok(vec![Symbol::qr(self.text.clone())])
    }
}

// ============================================================================
// Frames
// ============================================================================

pub fn frame_data(id: u64) -> FrameData {
    FrameData::new(
        id,
        SystemTime::now(),
        vec![0u8; 16],
        4,
        4,
        FrameFormat::Gray8,
        Rotation::Rotate0,
    )
}

/// Frame whose release bumps `released`
pub fn counted_frame(id: u64, released: &Arc<AtomicUsize>) -> Frame {
    let released = Arc::clone(released);
    Frame::new(frame_data(id), move |_| {
        released.fetch_add(1, Ordering::SeqCst);
    })
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ============================================================================
// Test server infrastructure
// ============================================================================

pub struct TestServer {
    base_url: Url,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn new(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });

        tokio::spawn(async move {
            server.await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url: Url::parse(&format!("http://{}/", addr)).unwrap(),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}
