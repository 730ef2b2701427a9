/// Run-control events
///
/// Typed events produced by the classifier from `*stopped` records (or
/// synthesized from prose stream lines). Each event keeps the token and
/// variable/value pairs of the record that triggered it.

use std::collections::HashMap;

use crate::types::{Frame, StreamRecord, Value};

/// Why execution halted, as reported by the `reason` variable of a
/// `*stopped` record. The set is closed; anything else falls through the
/// classifier's fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BreakpointHit,
    WatchpointTrigger,
    ReadWatchpointTrigger,
    AccessWatchpointTrigger,
    WatchpointScope,
    EndSteppingRange,
    SignalReceived,
    LocationReached,
    FunctionFinished,
    SolibEvent,
    ExitedNormally,
    Exited,
    ExitedSignalled,
    /// The fallback sentinel: stopped with no usable reason.
    Stopped,
}

impl StopReason {
    /// Verbatim, case-sensitive lookup. `None` routes the record into the
    /// fallback chain instead of failing.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "breakpoint-hit" => Some(StopReason::BreakpointHit),
            "watchpoint-trigger" => Some(StopReason::WatchpointTrigger),
            "read-watchpoint-trigger" => Some(StopReason::ReadWatchpointTrigger),
            "access-watchpoint-trigger" => Some(StopReason::AccessWatchpointTrigger),
            "watchpoint-scope" => Some(StopReason::WatchpointScope),
            "end-stepping-range" => Some(StopReason::EndSteppingRange),
            "signal-received" => Some(StopReason::SignalReceived),
            "location-reached" => Some(StopReason::LocationReached),
            "function-finished" => Some(StopReason::FunctionFinished),
            "solib-event" => Some(StopReason::SolibEvent),
            "exited-normally" => Some(StopReason::ExitedNormally),
            "exited" => Some(StopReason::Exited),
            "exited-signalled" => Some(StopReason::ExitedSignalled),
            "stopped" => Some(StopReason::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::BreakpointHit => "breakpoint-hit",
            StopReason::WatchpointTrigger => "watchpoint-trigger",
            StopReason::ReadWatchpointTrigger => "read-watchpoint-trigger",
            StopReason::AccessWatchpointTrigger => "access-watchpoint-trigger",
            StopReason::WatchpointScope => "watchpoint-scope",
            StopReason::EndSteppingRange => "end-stepping-range",
            StopReason::SignalReceived => "signal-received",
            StopReason::LocationReached => "location-reached",
            StopReason::FunctionFinished => "function-finished",
            StopReason::SolibEvent => "solib-event",
            StopReason::ExitedNormally => "exited-normally",
            StopReason::Exited => "exited",
            StopReason::ExitedSignalled => "exited-signalled",
            StopReason::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Access mode of a triggered watchpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Write,
    Read,
    Access,
}

/// Token and variable/value pairs of the record an event was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    pub token: Option<u32>,
    pub results: HashMap<String, Value>,
}

impl EventData {
    pub fn new(token: Option<u32>, results: HashMap<String, Value>) -> Self {
        EventData { token, results }
    }

    fn string_field(&self, name: &str) -> Option<String> {
        self.results
            .get(name)
            .and_then(Value::as_string)
            .map(str::to_string)
    }

    /// The stack frame reported with the stop, if any.
    pub fn frame(&self) -> Option<Frame> {
        self.results
            .get("frame")
            .and_then(Value::as_tuple)
            .map(Frame::from_tuple)
    }
}

/// A discrete run-control event, classified from debugger output.
#[derive(Debug, Clone, PartialEq)]
pub enum MiEvent {
    BreakpointHit {
        data: EventData,
        breakpoint: Option<u32>,
    },
    WatchpointTrigger {
        data: EventData,
        mode: WatchMode,
    },
    WatchpointScope {
        data: EventData,
        number: Option<u32>,
    },
    SteppingRange {
        data: EventData,
    },
    Signal {
        data: EventData,
        name: Option<String>,
        meaning: Option<String>,
    },
    LocationReached {
        data: EventData,
    },
    FunctionFinished {
        data: EventData,
        return_value: Option<String>,
    },
    SharedLib {
        data: EventData,
    },
    InferiorExit {
        data: EventData,
        exit_code: Option<i32>,
    },
    InferiorSignalExit {
        data: EventData,
        signal: Option<String>,
    },
    /// Stop with no recognized cause; always produced rather than losing
    /// the stop condition.
    Stopped {
        data: EventData,
    },
    /// Catchpoint stop reported only as a prose stream line by older
    /// debugger versions.
    CatchpointHit {
        data: EventData,
        number: Option<u32>,
        description: String,
    },
}

impl MiEvent {
    /// Build the event matching a recognized stop reason, extracting the
    /// reason-specific fields from the record pairs.
    pub fn from_reason(
        reason: StopReason,
        token: Option<u32>,
        results: HashMap<String, Value>,
    ) -> MiEvent {
        let data = EventData::new(token, results);
        match reason {
            StopReason::BreakpointHit => {
                let breakpoint = data.string_field("bkptno").and_then(|s| s.parse().ok());
                MiEvent::BreakpointHit { data, breakpoint }
            }
            StopReason::WatchpointTrigger => MiEvent::WatchpointTrigger {
                data,
                mode: WatchMode::Write,
            },
            StopReason::ReadWatchpointTrigger => MiEvent::WatchpointTrigger {
                data,
                mode: WatchMode::Read,
            },
            StopReason::AccessWatchpointTrigger => MiEvent::WatchpointTrigger {
                data,
                mode: WatchMode::Access,
            },
            StopReason::WatchpointScope => {
                let number = data.string_field("wpnum").and_then(|s| s.parse().ok());
                MiEvent::WatchpointScope { data, number }
            }
            StopReason::EndSteppingRange => MiEvent::SteppingRange { data },
            StopReason::SignalReceived => {
                let name = data.string_field("signal-name");
                let meaning = data.string_field("signal-meaning");
                MiEvent::Signal {
                    data,
                    name,
                    meaning,
                }
            }
            StopReason::LocationReached => MiEvent::LocationReached { data },
            StopReason::FunctionFinished => {
                let return_value = data.string_field("return-value");
                MiEvent::FunctionFinished { data, return_value }
            }
            StopReason::SolibEvent => MiEvent::SharedLib { data },
            StopReason::ExitedNormally | StopReason::Exited => {
                let exit_code = data.string_field("exit-code").and_then(|s| s.parse().ok());
                MiEvent::InferiorExit { data, exit_code }
            }
            StopReason::ExitedSignalled => {
                let signal = data.string_field("signal-name");
                MiEvent::InferiorSignalExit { data, signal }
            }
            StopReason::Stopped => MiEvent::Stopped { data },
        }
    }

    /// Build a catchpoint-hit event from a stop record and the stream
    /// line that reported it.
    pub fn catchpoint_hit(
        token: Option<u32>,
        results: HashMap<String, Value>,
        stream: &StreamRecord,
    ) -> MiEvent {
        let description = stream.text.trim().to_string();
        let number = description
            .strip_prefix("Catchpoint ")
            .map(|rest| rest.chars().take_while(char::is_ascii_digit).collect::<String>())
            .and_then(|digits| digits.parse().ok());
        MiEvent::CatchpointHit {
            data: EventData::new(token, results),
            number,
            description,
        }
    }

    pub fn data(&self) -> &EventData {
        match self {
            MiEvent::BreakpointHit { data, .. }
            | MiEvent::WatchpointTrigger { data, .. }
            | MiEvent::WatchpointScope { data, .. }
            | MiEvent::SteppingRange { data }
            | MiEvent::Signal { data, .. }
            | MiEvent::LocationReached { data }
            | MiEvent::FunctionFinished { data, .. }
            | MiEvent::SharedLib { data }
            | MiEvent::InferiorExit { data, .. }
            | MiEvent::InferiorSignalExit { data, .. }
            | MiEvent::Stopped { data }
            | MiEvent::CatchpointHit { data, .. } => data,
        }
    }

    /// Correlation token of the triggering record, if it carried one.
    pub fn token(&self) -> Option<u32> {
        self.data().token
    }

    /// Variable/value pairs carried over from the triggering record.
    pub fn results(&self) -> &HashMap<String, Value> {
        &self.data().results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamKind;

    fn pairs(entries: &[(&str, &str)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn reason_table_is_verbatim() {
        let table = [
            ("breakpoint-hit", StopReason::BreakpointHit),
            ("watchpoint-trigger", StopReason::WatchpointTrigger),
            ("read-watchpoint-trigger", StopReason::ReadWatchpointTrigger),
            (
                "access-watchpoint-trigger",
                StopReason::AccessWatchpointTrigger,
            ),
            ("watchpoint-scope", StopReason::WatchpointScope),
            ("end-stepping-range", StopReason::EndSteppingRange),
            ("signal-received", StopReason::SignalReceived),
            ("location-reached", StopReason::LocationReached),
            ("function-finished", StopReason::FunctionFinished),
            ("solib-event", StopReason::SolibEvent),
            ("exited-normally", StopReason::ExitedNormally),
            ("exited", StopReason::Exited),
            ("exited-signalled", StopReason::ExitedSignalled),
            ("stopped", StopReason::Stopped),
        ];
        for (text, reason) in table {
            assert_eq!(StopReason::from_str(text), Some(reason));
            assert_eq!(reason.to_string(), text);
        }
    }

    #[test]
    fn lookup_is_case_sensitive_and_closed() {
        assert_eq!(StopReason::from_str("Breakpoint-Hit"), None);
        assert_eq!(StopReason::from_str("fork"), None);
        assert_eq!(StopReason::from_str("syscall-entry"), None);
    }

    #[test]
    fn breakpoint_event_extracts_number() {
        let event = MiEvent::from_reason(
            StopReason::BreakpointHit,
            Some(7),
            pairs(&[("bkptno", "3"), ("thread-id", "1")]),
        );
        match &event {
            MiEvent::BreakpointHit { breakpoint, .. } => assert_eq!(*breakpoint, Some(3)),
            other => panic!("expected breakpoint hit, got {other:?}"),
        }
        assert_eq!(event.token(), Some(7));
        assert_eq!(
            event.results().get("thread-id").unwrap().as_string(),
            Some("1")
        );
    }

    #[test]
    fn watchpoint_reasons_map_to_modes() {
        let cases = [
            (StopReason::WatchpointTrigger, WatchMode::Write),
            (StopReason::ReadWatchpointTrigger, WatchMode::Read),
            (StopReason::AccessWatchpointTrigger, WatchMode::Access),
        ];
        for (reason, expected) in cases {
            match MiEvent::from_reason(reason, None, HashMap::new()) {
                MiEvent::WatchpointTrigger { mode, .. } => assert_eq!(mode, expected),
                other => panic!("expected watchpoint trigger, got {other:?}"),
            }
        }
    }

    #[test]
    fn signal_event_extracts_name_and_meaning() {
        let event = MiEvent::from_reason(
            StopReason::SignalReceived,
            None,
            pairs(&[("signal-name", "SIGSEGV"), ("signal-meaning", "Segmentation fault")]),
        );
        match event {
            MiEvent::Signal { name, meaning, .. } => {
                assert_eq!(name.as_deref(), Some("SIGSEGV"));
                assert_eq!(meaning.as_deref(), Some("Segmentation fault"));
            }
            other => panic!("expected signal event, got {other:?}"),
        }
    }

    #[test]
    fn exit_reasons_share_one_event_kind() {
        let exited = MiEvent::from_reason(
            StopReason::Exited,
            None,
            pairs(&[("exit-code", "1")]),
        );
        match exited {
            MiEvent::InferiorExit { exit_code, .. } => assert_eq!(exit_code, Some(1)),
            other => panic!("expected inferior exit, got {other:?}"),
        }
        let normal = MiEvent::from_reason(StopReason::ExitedNormally, None, HashMap::new());
        match normal {
            MiEvent::InferiorExit { exit_code, .. } => assert_eq!(exit_code, None),
            other => panic!("expected inferior exit, got {other:?}"),
        }
    }

    #[test]
    fn catchpoint_event_keeps_the_stream_line() {
        let stream = StreamRecord {
            kind: StreamKind::Console,
            text: "Catchpoint 2 (exception caught), 0x00secret in main ()\n".to_string(),
        };
        let event = MiEvent::catchpoint_hit(Some(9), HashMap::new(), &stream);
        match event {
            MiEvent::CatchpointHit {
                data,
                number,
                description,
            } => {
                assert_eq!(data.token, Some(9));
                assert_eq!(number, Some(2));
                assert!(description.starts_with("Catchpoint 2"));
            }
            other => panic!("expected catchpoint hit, got {other:?}"),
        }
    }

    #[test]
    fn frame_helper_reads_the_stop_frame() {
        let mut results = pairs(&[("reason", "end-stepping-range")]);
        results.insert(
            "frame".to_string(),
            Value::Tuple(pairs(&[("func", "compute"), ("line", "12")])),
        );
        let event = MiEvent::from_reason(StopReason::EndSteppingRange, None, results);
        let frame = event.data().frame().unwrap();
        assert_eq!(frame.function.as_deref(), Some("compute"));
        assert_eq!(frame.line, Some(12));
    }
}
