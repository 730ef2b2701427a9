/// MI bridge library
///
/// Bridges a GDB/MI debugger backend to a binary debugger wire protocol
/// consumed by IDE-side clients. The MI side is parsed into structured
/// records, classified into typed run-control events, and handed to an
/// outbound translator that owns the client wire format.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

pub mod commands;
pub mod connection;
pub mod events;
pub mod listener;
pub mod parser;
pub mod process;
pub mod processor;
pub mod types;
pub mod wire;

pub use commands::{
    BreakInsertInfo, BreakListInfo, CommandError, MiCommand, MiInfo, ResultShape, VersionInfo,
};
pub use connection::MiLink;
pub use events::{EventData, MiEvent, StopReason, WatchMode};
pub use listener::{DebuggerNotification, ListenerId, ListenerRegistry, OutputListener};
pub use parser::{parse_mi_line, ChunkAssembler, MiRecord, ParseError};
pub use process::GdbProcess;
pub use processor::RunControlEventProcessor;
pub use types::*;
pub use wire::{EventTranslator, OutboundPacket, TranslatorError, VmNotification};

#[derive(Error, Debug)]
pub enum GdbError {
    #[error("debugger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse debugger output: {0}")]
    Parse(#[from] parser::ParseError),
    #[error("command failed: {0}")]
    Command(#[from] commands::CommandError),
    #[error(transparent)]
    Translator(#[from] wire::TranslatorError),
    #[error("signal delivery failed: {0}")]
    Signal(String),
    #[error("debugger connection closed")]
    Closed,
    #[error("debugger session already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, GdbError>;

/// Control service for one debugger session: owns the backend process,
/// the MI transport link, and the listener registry event processors
/// register with.
pub struct GdbConnection {
    process: Option<process::GdbProcess>,
    link: MiLink,
    registry: Arc<ListenerRegistry>,
}

impl GdbConnection {
    pub fn new() -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        GdbConnection {
            process: None,
            link: MiLink::new(registry.clone()),
            registry,
        }
    }

    /// Registry used by this connection's reader task; event processors
    /// register here.
    pub fn registry(&self) -> Arc<ListenerRegistry> {
        self.registry.clone()
    }

    /// Spawn the debugger backend and wire up the MI transport.
    pub async fn start(&mut self, gdb_path: &str) -> Result<()> {
        if self.link.is_running() {
            return Err(GdbError::AlreadyRunning);
        }

        let mut process = process::GdbProcess::start(gdb_path)?;

        let stdin = process.take_stdin().ok_or(GdbError::Closed)?;
        let stdout = process.take_stdout().ok_or(GdbError::Closed)?;
        let stderr = process.take_stderr().ok_or(GdbError::Closed)?;

        self.link.attach(stdin, stdout);
        spawn_stderr_logger(stderr);
        self.process = Some(process);

        Ok(())
    }

    /// Send one typed command and decode its result.
    pub async fn execute<R: ResultShape>(&mut self, command: MiCommand<R>) -> Result<R> {
        self.link.execute(&command).await
    }

    /// Interrupt the running inferior via the backend process.
    pub fn interrupt(&mut self) -> Result<()> {
        match self.process.as_mut() {
            Some(process) => process.interrupt(),
            None => Err(GdbError::Closed),
        }
    }

    /// Inject a notification from the debuggee's runtime into the
    /// listener chain.
    pub fn notify_vm(&self, notification: VmNotification) -> Result<()> {
        self.registry
            .dispatch(&DebuggerNotification::Vm(notification))
    }

    pub fn is_running(&self) -> bool {
        self.link.is_running()
    }

    /// Ask the backend to exit, then tear the session down.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.link.is_running() {
            // The backend may die before answering; either way we stop.
            let _ = self.link.execute(&MiCommand::gdb_exit()).await;
        }

        self.link.shutdown();

        if let Some(mut process) = self.process.take() {
            let _ = process.kill().await;
        }

        Ok(())
    }
}

impl Default for GdbConnection {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_stderr_logger(stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        log::debug!("debugger stderr: {trimmed}");
                    }
                }
            }
        }
    });
}
