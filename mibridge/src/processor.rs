/// Run-control event classification
///
/// Listens for parsed MI output, determines which debugging event(s)
/// occurred, and hands typed events to the outbound translator. Every
/// `*stopped` record yields exactly one event: a recognized reason wins,
/// an old-style prose catchpoint line is used next, and a generic
/// stopped event is the guaranteed fallback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::events::{MiEvent, StopReason};
use crate::listener::{DebuggerNotification, ListenerId, ListenerRegistry, OutputListener};
use crate::types::{AsyncClass, AsyncRecord, MiOutput, OobRecord, StreamKind, Value};
use crate::wire::{EventTranslator, VmNotification};
use crate::Result;

/// Prefix of the prose line some debugger versions print instead of a
/// structured stop record when the inferior dies on a signal.
const TERMINATED_PREFIX: &str = "Program terminated with signal";

/// Prefix of the prose line older debuggers print for catchpoint stops.
const CATCHPOINT_PREFIX: &str = "Catchpoint ";

/// Classifies debugger output into run-control events.
///
/// Owns no state across invocations except its registration with the
/// listener registry, acquired at construction and released by
/// `dispose` (idempotent; `Drop` disposes as well).
pub struct RunControlEventProcessor {
    translator: Arc<dyn EventTranslator>,
    registry: Arc<ListenerRegistry>,
    registration: Mutex<Option<ListenerId>>,
}

impl RunControlEventProcessor {
    /// Create the processor and register it with the output registry.
    pub fn register(
        registry: Arc<ListenerRegistry>,
        translator: Arc<dyn EventTranslator>,
    ) -> Arc<Self> {
        let processor = Arc::new(RunControlEventProcessor {
            translator,
            registry: registry.clone(),
            registration: Mutex::new(None),
        });
        let id = registry.register(processor.clone());
        *processor.registration.lock().unwrap() = Some(id);
        processor
    }

    /// Release the registry registration. Safe to call more than once,
    /// and safe against a registry that was already torn down.
    pub fn dispose(&self) {
        if let Some(id) = self.registration.lock().unwrap().take() {
            self.registry.unregister(id);
        }
    }

    /// Classify one MI output chunk, forwarding every produced event in
    /// discovery order.
    pub fn process(&self, output: &MiOutput) -> Result<()> {
        for oob in &output.oob_records {
            match oob {
                OobRecord::Async(exec) if exec.class == AsyncClass::Stopped => {
                    let event = self.classify_stop(exec, output);
                    self.forward(event)?;
                }
                OobRecord::Stream(stream)
                    if stream.kind == StreamKind::Console
                        && stream.text.starts_with(TERMINATED_PREFIX) =>
                {
                    // Some debugger versions only report fatal signal
                    // termination as prose, with no stop record at all.
                    if let Some(event) = synthesize_signal_event(&stream.text) {
                        self.forward(event)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// The stop-classification chain. Always yields exactly one event.
    fn classify_stop(&self, exec: &AsyncRecord, chunk: &MiOutput) -> MiEvent {
        // A recognized reason terminates the scan.
        if let Some(Value::String(reason)) = exec.results.get("reason") {
            match StopReason::from_str(reason) {
                Some(reason) => {
                    return MiEvent::from_reason(reason, exec.token, exec.results.clone())
                }
                None => log::debug!("unrecognized stop reason {reason:?}"),
            }
        }

        // Old debuggers report catchpoint hits only in the stream lines
        // that precede the stop record within the same chunk.
        for stream in chunk.stream_records() {
            if stream.text.starts_with(CATCHPOINT_PREFIX) {
                return MiEvent::catchpoint_hit(exec.token, exec.results.clone(), stream);
            }
        }

        // No usable reason (temporary breakpoints on old debuggers omit
        // it entirely). The stop still has to reach the client.
        MiEvent::from_reason(StopReason::Stopped, exec.token, exec.results.clone())
    }

    /// Hand one event to the translator and send whatever it builds.
    fn forward(&self, event: MiEvent) -> Result<()> {
        log::debug!("run-control event: {event:?}");
        match self.translator.translate(&event) {
            Some(packet) => {
                packet.send()?;
                Ok(())
            }
            None => {
                log::debug!("event has no outbound packet, dropped");
                Ok(())
            }
        }
    }
}

impl OutputListener for RunControlEventProcessor {
    fn on_output(&self, notification: &DebuggerNotification) -> Result<()> {
        match notification {
            // Foreign runtime notifications never enter stop
            // classification; they translate directly.
            DebuggerNotification::Vm(event) => self.forward_vm(event),
            DebuggerNotification::Mi(output) => self.process(output),
        }
    }
}

impl RunControlEventProcessor {
    fn forward_vm(&self, event: &VmNotification) -> Result<()> {
        log::debug!("vm notification: {event:?}");
        if let Some(packet) = self.translator.translate_vm(event) {
            packet.send()?;
        }
        Ok(())
    }
}

impl Drop for RunControlEventProcessor {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Parse `Program terminated with signal <signal>, <reason>.` into a
/// synthetic signal event. Lines that do not match produce nothing; the
/// prose varies too much across versions to treat that as an error.
fn synthesize_signal_event(text: &str) -> Option<MiEvent> {
    let pattern = Regex::new(r"^Program terminated with signal (.*?), (.*)\.").ok()?;
    let caps = pattern.captures(text.trim_end())?;

    let mut results = HashMap::new();
    results.insert(
        "signal-name".to_string(),
        Value::String(caps[1].to_string()),
    );
    results.insert(
        "signal-meaning".to_string(),
        Value::String(caps[2].to_string()),
    );
    Some(MiEvent::from_reason(StopReason::SignalReceived, None, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StreamRecord, ResultRecord, ResultClass};
    use crate::wire::{OutboundPacket, TranslatorError};
    use crate::GdbError;

    /// Translator that records every event and optionally fails sends.
    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<MiEvent>>,
        vm_events: Mutex<Vec<VmNotification>>,
        fail_send: bool,
    }

    struct RecordedPacket {
        ok: bool,
    }

    impl OutboundPacket for RecordedPacket {
        fn send(self: Box<Self>) -> std::result::Result<(), TranslatorError> {
            if self.ok {
                Ok(())
            } else {
                Err(TranslatorError::Send("connection reset".into()))
            }
        }
    }

    impl EventTranslator for Recording {
        fn translate(&self, event: &MiEvent) -> Option<Box<dyn OutboundPacket>> {
            self.events.lock().unwrap().push(event.clone());
            Some(Box::new(RecordedPacket { ok: !self.fail_send }))
        }

        fn translate_vm(&self, event: &VmNotification) -> Option<Box<dyn OutboundPacket>> {
            self.vm_events.lock().unwrap().push(event.clone());
            Some(Box::new(RecordedPacket { ok: !self.fail_send }))
        }
    }

    fn stopped(token: Option<u32>, pairs: &[(&str, &str)]) -> AsyncRecord {
        AsyncRecord {
            token,
            class: AsyncClass::Stopped,
            results: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        }
    }

    fn console(text: &str) -> StreamRecord {
        StreamRecord {
            kind: StreamKind::Console,
            text: text.to_string(),
        }
    }

    fn setup() -> (Arc<ListenerRegistry>, Arc<Recording>, Arc<RunControlEventProcessor>) {
        let registry = Arc::new(ListenerRegistry::new());
        let translator = Arc::new(Recording::default());
        let processor = RunControlEventProcessor::register(registry.clone(), translator.clone());
        (registry, translator, processor)
    }

    #[test]
    fn recognized_reason_yields_matching_event() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![OobRecord::Async(stopped(
                Some(11),
                &[("reason", "breakpoint-hit"), ("bkptno", "1"), ("thread-id", "1")],
            ))],
            result_record: None,
        };

        processor.process(&output).unwrap();

        let events = translator.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MiEvent::BreakpointHit { data, breakpoint } => {
                assert_eq!(data.token, Some(11));
                assert_eq!(*breakpoint, Some(1));
                assert_eq!(
                    data.results.get("thread-id").unwrap().as_string(),
                    Some("1")
                );
            }
            other => panic!("expected breakpoint hit, got {other:?}"),
        }
    }

    #[test]
    fn missing_reason_falls_back_to_generic_stopped() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![OobRecord::Async(stopped(None, &[("thread-id", "1")]))],
            result_record: None,
        };

        processor.process(&output).unwrap();

        let events = translator.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MiEvent::Stopped { .. }));
    }

    #[test]
    fn unrecognized_reason_with_catchpoint_line_becomes_catchpoint_hit() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![
                OobRecord::Stream(console("Catchpoint 1 (exception caught)\n")),
                OobRecord::Async(stopped(Some(5), &[("reason", "unheard-of-reason")])),
            ],
            result_record: None,
        };

        processor.process(&output).unwrap();

        let events = translator.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MiEvent::CatchpointHit { data, number, .. } => {
                assert_eq!(data.token, Some(5));
                assert_eq!(*number, Some(1));
            }
            other => panic!("expected catchpoint hit, got {other:?}"),
        }
    }

    #[test]
    fn only_first_catchpoint_line_is_used() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![
                OobRecord::Stream(console("Catchpoint 1 (exception caught)\n")),
                OobRecord::Stream(console("Catchpoint 2 (exception caught)\n")),
                OobRecord::Async(stopped(None, &[])),
            ],
            result_record: None,
        };

        processor.process(&output).unwrap();

        let events = translator.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MiEvent::CatchpointHit { number, .. } => assert_eq!(*number, Some(1)),
            other => panic!("expected catchpoint hit, got {other:?}"),
        }
    }

    #[test]
    fn non_string_reason_is_skipped_not_fatal() {
        let (_, translator, processor) = setup();
        let mut record = stopped(None, &[]);
        record
            .results
            .insert("reason".to_string(), Value::List(Vec::new()));
        let output = MiOutput {
            oob_records: vec![OobRecord::Async(record)],
            result_record: None,
        };

        processor.process(&output).unwrap();

        let events = translator.events.lock().unwrap();
        assert!(matches!(events[0], MiEvent::Stopped { .. }));
    }

    #[test]
    fn terminated_line_synthesizes_signal_event() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![OobRecord::Stream(console(
                "Program terminated with signal SIGABRT, Aborted.\n",
            ))],
            result_record: None,
        };

        processor.process(&output).unwrap();

        let events = translator.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MiEvent::Signal { name, meaning, data } => {
                assert_eq!(name.as_deref(), Some("SIGABRT"));
                assert_eq!(meaning.as_deref(), Some("Aborted"));
                assert_eq!(data.token, None);
            }
            other => panic!("expected signal event, got {other:?}"),
        }
    }

    #[test]
    fn malformed_terminated_line_produces_nothing() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![OobRecord::Stream(console(
                "Program terminated with signal SIGFOO no comma here",
            ))],
            result_record: None,
        };

        processor.process(&output).unwrap();
        assert!(translator.events.lock().unwrap().is_empty());
    }

    #[test]
    fn reclassifying_is_stateless() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![OobRecord::Async(stopped(
                Some(3),
                &[("reason", "end-stepping-range")],
            ))],
            result_record: None,
        };

        processor.process(&output).unwrap();
        processor.process(&output).unwrap();

        let events = translator.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], events[1]);
    }

    #[test]
    fn emission_order_matches_record_order() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![
                OobRecord::Async(stopped(Some(1), &[("reason", "signal-received")])),
                OobRecord::Async(stopped(Some(2), &[("reason", "breakpoint-hit")])),
            ],
            result_record: None,
        };

        processor.process(&output).unwrap();

        let events = translator.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MiEvent::Signal { .. }));
        assert!(matches!(events[1], MiEvent::BreakpointHit { .. }));
    }

    #[test]
    fn result_records_and_other_async_classes_are_ignored() {
        let (_, translator, processor) = setup();
        let output = MiOutput {
            oob_records: vec![OobRecord::Async(AsyncRecord {
                token: None,
                class: AsyncClass::Running,
                results: HashMap::new(),
            })],
            result_record: Some(ResultRecord {
                token: Some(1),
                class: ResultClass::Done,
                results: HashMap::new(),
            }),
        };

        processor.process(&output).unwrap();
        assert!(translator.events.lock().unwrap().is_empty());
    }

    #[test]
    fn vm_notifications_bypass_classification() {
        let (registry, translator, _processor) = setup();
        let notification = DebuggerNotification::Vm(VmNotification::ClassPrepare {
            thread_id: 1,
            signature: "Lcom/example/Main;".to_string(),
        });

        registry.dispatch(&notification).unwrap();

        assert!(translator.events.lock().unwrap().is_empty());
        assert_eq!(translator.vm_events.lock().unwrap().len(), 1);
    }

    #[test]
    fn send_failure_propagates_unretried() {
        let registry = Arc::new(ListenerRegistry::new());
        let translator = Arc::new(Recording {
            fail_send: true,
            ..Recording::default()
        });
        let processor = RunControlEventProcessor::register(registry, translator.clone());

        let output = MiOutput {
            oob_records: vec![OobRecord::Async(stopped(
                None,
                &[("reason", "breakpoint-hit")],
            ))],
            result_record: None,
        };

        match processor.process(&output) {
            Err(GdbError::Translator(TranslatorError::Send(_))) => {}
            other => panic!("expected send failure, got {other:?}"),
        }
        // Classification itself still ran once.
        assert_eq!(translator.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn dispose_is_idempotent_and_stops_delivery() {
        let (registry, translator, processor) = setup();
        processor.dispose();
        processor.dispose();

        let output = DebuggerNotification::Mi(MiOutput {
            oob_records: vec![OobRecord::Async(stopped(
                None,
                &[("reason", "breakpoint-hit")],
            ))],
            result_record: None,
        });
        registry.dispatch(&output).unwrap();

        assert!(translator.events.lock().unwrap().is_empty());
    }
}
