use crate::state::{MetadataView, ScanSnapshot, ScanState};
use crossterm::style::{
    Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
};
use crossterm::QueueableCommand;
use std::io::{self, Write};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Status,
    Error,
    Code,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLine {
    pub kind: OverlayKind,
    pub text: String,
}

impl OverlayLine {
    fn new<S: Into<String>>(kind: OverlayKind, text: S) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// What the scan screen shows for a snapshot, top to bottom
pub fn overlay_lines(snapshot: &ScanSnapshot) -> Vec<OverlayLine> {
    let mut lines = Vec::new();

    match &snapshot.state {
        ScanState::Initializing => {
            lines.push(OverlayLine::new(OverlayKind::Status, "Initializing camera..."))
        }
        ScanState::Error(message) => {
            lines.push(OverlayLine::new(OverlayKind::Error, message.clone()))
        }
        ScanState::Ready => {}
    }

    if let Some(text) = snapshot.decoded_text() {
        lines.push(OverlayLine::new(OverlayKind::Code, format!("QR Code: {}", text)));
    }

    match &snapshot.metadata {
        Some(MetadataView::Found(record)) => {
            lines.push(OverlayLine::new(OverlayKind::Metadata, format!("Info: {}", record.data)))
        }
        Some(MetadataView::Failed(message)) => lines.push(OverlayLine::new(
            OverlayKind::Metadata,
            format!("Lookup failed: {}", message),
        )),
        None => {}
    }

    lines
}

/// Writes overlay updates to a terminal
pub struct TerminalPresenter {
    cancellation_token: CancellationToken,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self {
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Render every change observed on `receiver` until stopped or the store closes
    pub fn start(&self, mut receiver: watch::Receiver<ScanSnapshot>) -> JoinHandle<()> {
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            info!("Terminal presenter started");
            let mut last_rendered: Vec<OverlayLine> = Vec::new();

            loop {
                let lines = overlay_lines(&receiver.borrow_and_update());
                if lines != last_rendered {
                    if let Err(e) = Self::render(&mut io::stdout(), &lines) {
                        error!("Failed to render overlay: {}", e);
                    }
                    last_rendered = lines;
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            debug!("Scan state closed, presenter exiting");
                            break;
                        }
                    }
                }
            }

            info!("Terminal presenter stopped");
        })
    }

    pub fn stop(&self) {
        self.cancellation_token.cancel();
    }

    pub fn render<W: Write>(out: &mut W, lines: &[OverlayLine]) -> io::Result<()> {
        for line in lines {
            match line.kind {
                OverlayKind::Status => {
                    out.queue(SetForegroundColor(Color::White))?;
                }
                OverlayKind::Error => {
                    out.queue(SetBackgroundColor(Color::DarkRed))?
                        .queue(SetForegroundColor(Color::White))?;
                }
                OverlayKind::Code => {
                    out.queue(SetAttribute(Attribute::Bold))?;
                }
                OverlayKind::Metadata => {
                    out.queue(SetForegroundColor(Color::Cyan))?;
                }
            }
            out.queue(Print(&line.text))?
                .queue(SetAttribute(Attribute::Reset))?
                .queue(ResetColor)?
                .queue(Print("\r\n"))?;
        }
        out.flush()
    }
}

impl Default for TerminalPresenter {
    fn default() -> Self {
        Self::new()
    }
}
