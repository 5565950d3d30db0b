//! Export sessions: thread-per-export execution with an identified event
//! stream, so concurrent exports can share one channel without their
//! progress interleaving anonymously.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use uuid::Uuid;

use super::pipeline::{ExportObserver, ExportReport, ExportRequest, Exporter};

/// Message from an export session to whoever is listening.
#[derive(Debug)]
pub struct ExportEvent {
    pub session: Uuid,
    pub kind: ExportEventKind,
}

#[derive(Debug)]
pub enum ExportEventKind {
    Started,
    /// Throttled percentage, 0-100.
    Progress(f64),
    /// One-shot notice that hardware encoding was abandoned.
    FallingBackToSoftware,
    Completed {
        report: Box<ExportReport>,
    },
    Failed {
        error: String,
    },
}

struct ChannelObserver {
    session: Uuid,
    tx: Sender<ExportEvent>,
}

impl ChannelObserver {
    fn send(&self, kind: ExportEventKind) {
        // A dropped receiver must not kill the export; the encode keeps
        // running to completion regardless.
        let _ = self.tx.send(ExportEvent {
            session: self.session,
            kind,
        });
    }
}

impl ExportObserver for ChannelObserver {
    fn on_progress(&mut self, percent: f64) {
        self.send(ExportEventKind::Progress(percent));
    }

    fn on_fallback(&mut self) {
        self.send(ExportEventKind::FallingBackToSoftware);
    }
}

/// Handle to a spawned export.
pub struct ExportSession {
    pub id: Uuid,
    pub output_path: PathBuf,
    handle: JoinHandle<()>,
}

impl ExportSession {
    /// Run `request` on a background thread, reporting through `tx`. Events
    /// carry the returned session id. There is no cancellation: the export
    /// runs to completion or failure once spawned.
    pub fn spawn(
        exporter: Arc<Exporter>,
        request: ExportRequest,
        tx: Sender<ExportEvent>,
    ) -> Self {
        let id = Uuid::new_v4();
        let output_path = request.output_path.clone();

        let handle = std::thread::spawn(move || {
            let mut observer = ChannelObserver {
                session: id,
                tx: tx.clone(),
            };
            observer.send(ExportEventKind::Started);

            match exporter.export(&request, &mut observer) {
                Ok(report) => observer.send(ExportEventKind::Completed {
                    report: Box::new(report),
                }),
                Err(e) => observer.send(ExportEventKind::Failed {
                    error: e.to_string(),
                }),
            }
        });

        Self {
            id,
            output_path,
            handle,
        }
    }

    /// Wait for the session thread to finish.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}
