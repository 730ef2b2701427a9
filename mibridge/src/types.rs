/// GDB/MI record model
///
/// This module defines the data structures used to represent parsed
/// GDB/MI protocol output.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One parsed chunk of MI output: every out-of-band record that arrived
/// since the previous `(gdb)` prompt, plus at most one result record.
///
/// Out-of-band ordering reflects protocol arrival order. Stream lines
/// that explain an async record may arrive before it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MiOutput {
    pub oob_records: Vec<OobRecord>,
    pub result_record: Option<ResultRecord>,
}

impl MiOutput {
    pub fn is_empty(&self) -> bool {
        self.oob_records.is_empty() && self.result_record.is_none()
    }

    /// Iterate over the stream-text records of this chunk, in arrival order.
    pub fn stream_records(&self) -> impl Iterator<Item = &StreamRecord> {
        self.oob_records.iter().filter_map(|record| match record {
            OobRecord::Stream(stream) => Some(stream),
            _ => None,
        })
    }
}

/// A record not tied to a specific command's direct result.
#[derive(Debug, Clone, PartialEq)]
pub enum OobRecord {
    Async(AsyncRecord),
    Stream(StreamRecord),
}

/// Completion record for a command (`^done`, `^error`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub token: Option<u32>,
    pub class: ResultClass,
    pub results: HashMap<String, Value>,
}

/// GDB/MI result classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

/// An asynchronous notification (`*stopped`, `=thread-created`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncRecord {
    pub token: Option<u32>,
    pub class: AsyncClass,
    pub results: HashMap<String, Value>,
}

/// GDB/MI async classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncClass {
    // Exec async records
    Running,
    Stopped,

    // Notify async records
    ThreadGroupAdded,
    ThreadGroupRemoved,
    ThreadGroupStarted,
    ThreadGroupExited,
    ThreadCreated,
    ThreadExited,
    ThreadSelected,
    LibraryLoaded,
    LibraryUnloaded,
    BreakpointCreated,
    BreakpointModified,
    BreakpointDeleted,
    CmdParamChanged,
    MemoryChanged,

    /// Async class this crate has no dedicated handling for. Kept verbatim
    /// so newer debugger versions do not break the record stream.
    Other(String),
}

impl AsyncClass {
    pub fn from_class_str(s: &str) -> Self {
        match s {
            "running" => AsyncClass::Running,
            "stopped" => AsyncClass::Stopped,
            "thread-group-added" => AsyncClass::ThreadGroupAdded,
            "thread-group-removed" => AsyncClass::ThreadGroupRemoved,
            "thread-group-started" => AsyncClass::ThreadGroupStarted,
            "thread-group-exited" => AsyncClass::ThreadGroupExited,
            "thread-created" => AsyncClass::ThreadCreated,
            "thread-exited" => AsyncClass::ThreadExited,
            "thread-selected" => AsyncClass::ThreadSelected,
            "library-loaded" => AsyncClass::LibraryLoaded,
            "library-unloaded" => AsyncClass::LibraryUnloaded,
            "breakpoint-created" => AsyncClass::BreakpointCreated,
            "breakpoint-modified" => AsyncClass::BreakpointModified,
            "breakpoint-deleted" => AsyncClass::BreakpointDeleted,
            "cmd-param-changed" => AsyncClass::CmdParamChanged,
            "memory-changed" => AsyncClass::MemoryChanged,
            other => AsyncClass::Other(other.to_string()),
        }
    }
}

/// A raw line of human-readable debugger output.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub text: String,
}

/// Origin of a stream record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Console, // ~ prefix
    Target,  // @ prefix
    Log,     // & prefix
}

/// Values carried by result and async records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    List(Vec<Value>),
    Tuple(HashMap<String, Value>),
}

impl Value {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }
}

fn owned_string(tuple: &HashMap<String, Value>, key: &str) -> Option<String> {
    tuple.get(key).and_then(Value::as_string).map(str::to_string)
}

/// Breakpoint information as reported by `-break-insert` / `-break-list`
/// (and by `-break-watch`, which reports only number and expression).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub number: u32,
    pub enabled: bool,
    pub address: Option<String>,
    pub function: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
    pub times: u32,
}

impl Breakpoint {
    pub fn from_tuple(tuple: &HashMap<String, Value>) -> Option<Self> {
        let number = tuple
            .get("number")
            .and_then(Value::as_string)
            .and_then(|s| s.parse().ok())?;

        let enabled = tuple
            .get("enabled")
            .and_then(Value::as_string)
            .map(|s| s == "y")
            .unwrap_or(true);

        let line = tuple
            .get("line")
            .and_then(Value::as_string)
            .and_then(|s| s.parse().ok());

        let times = tuple
            .get("times")
            .and_then(Value::as_string)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        Some(Breakpoint {
            number,
            enabled,
            address: owned_string(tuple, "addr"),
            function: owned_string(tuple, "func"),
            file: owned_string(tuple, "file"),
            fullname: owned_string(tuple, "fullname"),
            line,
            times,
        })
    }
}

/// A stack frame as carried by `*stopped` records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub address: Option<String>,
    pub function: Option<String>,
    pub args: Vec<Argument>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
}

impl Frame {
    pub fn from_tuple(tuple: &HashMap<String, Value>) -> Self {
        let line = tuple
            .get("line")
            .and_then(Value::as_string)
            .and_then(|s| s.parse().ok());

        let args = tuple
            .get("args")
            .and_then(Value::as_list)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_tuple)
                    .filter_map(Argument::from_tuple)
                    .collect()
            })
            .unwrap_or_default();

        Frame {
            address: owned_string(tuple, "addr"),
            function: owned_string(tuple, "func"),
            args,
            file: owned_string(tuple, "file"),
            fullname: owned_string(tuple, "fullname"),
            line,
        }
    }
}

/// A function argument inside a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: String,
}

impl Argument {
    pub fn from_tuple(tuple: &HashMap<String, Value>) -> Option<Self> {
        Some(Argument {
            name: owned_string(tuple, "name")?,
            value: owned_string(tuple, "value")?,
        })
    }
}
