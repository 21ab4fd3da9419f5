use crate::config::ScanConfig;
use crate::error::DecodeError;
use crate::frame::FrameData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Symbology of a recognized symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolFormat {
    QrCode,
    DataMatrix,
    Ean13,
    Code128,
    Unknown,
}

/// One symbol found in a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub format: SymbolFormat,
    /// Human-readable value, absent when the payload is not text
    pub text: Option<String>,
}

impl Symbol {
    pub fn qr<S: Into<String>>(text: S) -> Self {
        Self {
            format: SymbolFormat::QrCode,
            text: Some(text.into()),
        }
    }

    /// A symbol that was located but carries no textual value
    pub fn opaque(format: SymbolFormat) -> Self {
        Self { format, text: None }
    }

    /// Text value if present and non-empty
    pub fn display_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.is_empty())
    }
}

/// Asynchronous symbol recognizer. Recognition itself lives behind this trait;
/// the pipeline only consumes its ordered results.
///
/// Results are returned in the decoder's own order; callers must not reorder them.
#[async_trait]
pub trait Decoder: Send + Sync + 'static {
    async fn decode(&self, frame: &FrameData) -> Result<Vec<Symbol>, DecodeError>;
}

/// Deterministic stand-in for a vision library.
///
/// Frame ids drive the outcome so runs are reproducible: every `fail_every`-th
/// frame fails, every `hit_every`-th frame yields the next configured code, all
/// other frames contain nothing.
#[derive(Debug, Clone)]
pub struct SimulatedDecoder {
    codes: Vec<String>,
    latency: Duration,
    hit_every: u64,
    fail_every: u64,
}

impl SimulatedDecoder {
    pub fn new(codes: Vec<String>, latency: Duration, hit_every: u64, fail_every: u64) -> Self {
        Self {
            codes,
            latency,
            hit_every,
            fail_every,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.simulated_codes.clone(),
            Duration::from_millis(config.decode_latency_ms),
            config.hit_every,
            config.fail_every,
        )
    }

    fn outcome_for(&self, frame_id: u64) -> Result<Vec<Symbol>, DecodeError> {
        let ordinal = frame_id + 1;

        if self.fail_every > 0 && ordinal % self.fail_every == 0 {
            return Err(DecodeError::failed(frame_id, "simulated decoder failure"));
        }

        if self.hit_every > 0 && !self.codes.is_empty() && ordinal % self.hit_every == 0 {
            let index = ((ordinal / self.hit_every - 1) % self.codes.len() as u64) as usize;
            return Ok(vec![Symbol::qr(self.codes[index].clone())]);
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl Decoder for SimulatedDecoder {
    async fn decode(&self, frame: &FrameData) -> Result<Vec<Symbol>, DecodeError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self.outcome_for(frame.id);
        trace!(
            "Simulated decode of frame {} ({:?}): {:?}",
            frame.id,
            frame.rotation,
            outcome
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFormat, Rotation};
    use std::time::SystemTime;

    fn frame(id: u64) -> FrameData {
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

    #[test]
    fn test_display_text_skips_empty() {
        assert_eq!(Symbol::qr("abc").display_text(), Some("abc"));
        assert_eq!(Symbol::qr("").display_text(), None);
        assert_eq!(Symbol::opaque(SymbolFormat::Ean13).display_text(), None);
    }

    #[tokio::test]
    async fn test_simulated_decoder_cycles_codes() {
        let decoder = SimulatedDecoder::new(
            vec!["a".to_string(), "b".to_string()],
            Duration::ZERO,
            2,
            0,
        );

        assert!(decoder.decode(&frame(0)).await.unwrap().is_empty());
        assert_eq!(decoder.decode(&frame(1)).await.unwrap(), vec![Symbol::qr("a")]);
        assert!(decoder.decode(&frame(2)).await.unwrap().is_empty());
        assert_eq!(decoder.decode(&frame(3)).await.unwrap(), vec![Symbol::qr("b")]);
        assert_eq!(decoder.decode(&frame(5)).await.unwrap(), vec![Symbol::qr("a")]);
    }

    #[tokio::test]
    async fn test_simulated_decoder_failures_take_precedence() {
        let decoder = SimulatedDecoder::new(vec!["a".to_string()], Duration::ZERO, 1, 3);

        assert!(decoder.decode(&frame(0)).await.is_ok());
        assert!(matches!(
            decoder.decode(&frame(2)).await,
            Err(DecodeError::Failed { frame_id: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_simulated_decoder_without_codes_finds_nothing() {
        let decoder = SimulatedDecoder::new(Vec::new(), Duration::ZERO, 1, 0);
        assert!(decoder.decode(&frame(0)).await.unwrap().is_empty());
    }
}
