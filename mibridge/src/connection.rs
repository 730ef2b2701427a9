/// MI transport link
///
/// Owns the write half of the debugger connection and the reader task
/// that turns raw output lines into `MiOutput` chunks. Result records
/// carrying a token complete the matching pending command; every
/// completed chunk is pushed through the listener registry on the
/// reader task, preserving arrival order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;

use crate::commands::{MiCommand, ResultShape};
use crate::listener::{DebuggerNotification, ListenerRegistry};
use crate::parser::ChunkAssembler;
use crate::types::ResultRecord;
use crate::{GdbError, Result};

type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<ResultRecord>>>>;

pub struct MiLink {
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    token_counter: AtomicU32,
    pending: PendingMap,
    registry: Arc<ListenerRegistry>,
    is_running: Arc<AtomicBool>,
}

impl MiLink {
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        MiLink {
            writer: None,
            token_counter: AtomicU32::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            registry,
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach the link to a connected debugger and start the reader task.
    pub fn attach(
        &mut self,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) {
        self.writer = Some(Box::new(writer));
        self.is_running.store(true, Ordering::SeqCst);
        self.spawn_reader(reader);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Close the write half. The reader task winds down at EOF.
    pub fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.writer = None;
        self.pending.lock().unwrap().clear();
    }

    /// Send one typed command and decode its result record with the
    /// descriptor's result shape.
    pub async fn execute<R: ResultShape>(&mut self, command: &MiCommand<R>) -> Result<R> {
        if !self.is_running() {
            return Err(GdbError::Closed);
        }

        let token = self.token_counter.fetch_add(1, Ordering::SeqCst);
        let line = format!("{}{}\n", token, command.text());
        log::debug!("SEND[{token}]: {}", line.trim_end());

        let (sender, receiver) = oneshot::channel();
        self.pending.lock().unwrap().insert(token, sender);

        match self.writer.as_mut() {
            Some(writer) => {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            None => {
                self.pending.lock().unwrap().remove(&token);
                return Err(GdbError::Closed);
            }
        }

        let record = receiver.await.map_err(|_| GdbError::Closed)?;
        log::debug!("RECV[{token}]: class={:?}", record.class);
        Ok(command.decode(&record)?)
    }

    fn spawn_reader(&self, reader: impl AsyncRead + Send + Unpin + 'static) {
        let pending = self.pending.clone();
        let registry = self.registry.clone();
        let is_running = self.is_running.clone();

        tokio::spawn(async move {
            log::debug!("MI reader task started");
            let mut reader = BufReader::new(reader);
            let mut assembler = ChunkAssembler::new();
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        log::debug!("MI reader: EOF");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match assembler.push_line(trimmed) {
                            Ok(Some(chunk)) => {
                                deliver_chunk(chunk, &pending, &registry);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                log::warn!("unparseable MI line {trimmed:?}: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("MI reader error: {e}");
                        break;
                    }
                }
            }

            is_running.store(false, Ordering::SeqCst);
            pending.lock().unwrap().clear();
            log::debug!("MI reader task finished");
        });
    }
}

/// Complete the pending command the chunk's result record belongs to,
/// then hand the whole chunk to the listeners.
fn deliver_chunk(chunk: crate::types::MiOutput, pending: &PendingMap, registry: &ListenerRegistry) {
    if let Some(record) = &chunk.result_record {
        if let Some(token) = record.token {
            match pending.lock().unwrap().remove(&token) {
                Some(sender) => {
                    let _ = sender.send(record.clone());
                }
                None => log::warn!("result record for unknown token {token}"),
            }
        }
    }

    if chunk.is_empty() {
        return;
    }

    if let Err(e) = registry.dispatch(&DebuggerNotification::Mi(chunk)) {
        log::error!("listener dispatch failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::MiInfo;
    use crate::listener::OutputListener;
    use crate::types::ResultClass;
    use tokio::io::AsyncReadExt;

    struct Collect(Mutex<Vec<DebuggerNotification>>);

    impl OutputListener for Collect {
        fn on_output(&self, notification: &DebuggerNotification) -> Result<()> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn execute_correlates_result_by_token() {
        let registry = Arc::new(ListenerRegistry::new());
        let mut link = MiLink::new(registry.clone());

        let (command_tx, mut command_rx) = tokio::io::duplex(1024);
        let (mut output_tx, output_rx) = tokio::io::duplex(1024);
        link.attach(command_tx, output_rx);

        // Fake debugger: read the command line, answer with its token.
        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let n = command_rx.read(&mut buf).await.unwrap();
            let sent = String::from_utf8_lossy(&buf[..n]).to_string();
            let token: String = sent.chars().take_while(char::is_ascii_digit).collect();
            let reply = format!("*running,thread-id=\"all\"\n{token}^done\n(gdb)\n");
            output_tx.write_all(reply.as_bytes()).await.unwrap();
            sent
        });

        let info: MiInfo = link.execute(&MiCommand::exec_continue()).await.unwrap();
        assert_eq!(info.class, ResultClass::Done);

        let sent = responder.await.unwrap();
        assert!(sent.trim_end().ends_with("-exec-continue"));
    }

    #[tokio::test]
    async fn chunks_are_dispatched_to_listeners() {
        let registry = Arc::new(ListenerRegistry::new());
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        registry.register(collect.clone());

        let mut link = MiLink::new(registry);
        let (writer, _keep) = tokio::io::duplex(64);
        let (mut output_tx, output_rx) = tokio::io::duplex(1024);
        link.attach(writer, output_rx);

        output_tx
            .write_all(b"*stopped,reason=\"breakpoint-hit\",bkptno=\"1\"\n(gdb)\n")
            .await
            .unwrap();
        drop(output_tx);

        // Give the reader task a chance to drain the stream.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let seen = collect.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            DebuggerNotification::Mi(chunk) => {
                assert_eq!(chunk.oob_records.len(), 1);
            }
            other => panic!("expected MI chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_without_attach_fails_closed() {
        let registry = Arc::new(ListenerRegistry::new());
        let mut link = MiLink::new(registry);
        match link.execute(&MiCommand::exec_continue()).await {
            Err(GdbError::Closed) => {}
            other => panic!("expected closed link error, got {other:?}"),
        }
    }
}
