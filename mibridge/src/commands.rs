/// Typed GDB/MI command descriptors
///
/// An `MiCommand<R>` pairs the literal wire text of one MI command with
/// the shape `R` its eventual result record decodes into. The shape is
/// fixed at construction; the transport treats every command uniformly
/// as text in, raw result record out, and the call site decodes with the
/// descriptor it kept.

use std::collections::HashMap;
use std::marker::PhantomData;
use thiserror::Error;

use crate::types::{Breakpoint, ResultClass, ResultRecord, Value};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("debugger rejected command: {0}")]
    Rejected(String),
    #[error("missing field in result record: {0}")]
    MissingField(&'static str),
    #[error("unexpected shape for field: {0}")]
    UnexpectedShape(&'static str),
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Decoder for one result-record shape.
///
/// Implementations are selected at the `MiCommand` construction site and
/// carried as a type parameter; no runtime inspection of the result text
/// is needed to pick the decoder.
pub trait ResultShape: Sized {
    fn decode(record: &ResultRecord) -> Result<Self>;
}

/// Result of a command with no structured payload beyond its class.
#[derive(Debug, Clone, PartialEq)]
pub struct MiInfo {
    pub class: ResultClass,
    pub results: HashMap<String, Value>,
}

impl ResultShape for MiInfo {
    fn decode(record: &ResultRecord) -> Result<Self> {
        Ok(MiInfo {
            class: record.class,
            results: record.results.clone(),
        })
    }
}

/// Result of `-break-insert` and `-break-watch`.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakInsertInfo {
    pub breakpoint: Breakpoint,
}

impl ResultShape for BreakInsertInfo {
    fn decode(record: &ResultRecord) -> Result<Self> {
        // Watchpoints come back under wpt/hw-rwpt/hw-awpt instead of bkpt.
        let tuple = ["bkpt", "wpt", "hw-rwpt", "hw-awpt"]
            .iter()
            .find_map(|key| record.results.get(*key))
            .ok_or(CommandError::MissingField("bkpt"))?
            .as_tuple()
            .ok_or(CommandError::UnexpectedShape("bkpt"))?;

        let breakpoint =
            Breakpoint::from_tuple(tuple).ok_or(CommandError::MissingField("bkpt.number"))?;
        Ok(BreakInsertInfo { breakpoint })
    }
}

/// Result of `-break-list`.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakListInfo {
    pub breakpoints: Vec<Breakpoint>,
}

impl ResultShape for BreakListInfo {
    fn decode(record: &ResultRecord) -> Result<Self> {
        let body = record
            .results
            .get("BreakpointTable")
            .and_then(Value::as_tuple)
            .and_then(|table| table.get("body"))
            .ok_or(CommandError::MissingField("BreakpointTable.body"))?;

        let breakpoints = body
            .as_list()
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_tuple)
                    .filter_map(Breakpoint::from_tuple)
                    .collect()
            })
            .unwrap_or_default();

        Ok(BreakListInfo { breakpoints })
    }
}

/// Result of `-gdb-version`. The banner itself arrives on the console
/// stream; the result record carries a version field only on newer
/// debugger builds.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub version: Option<String>,
}

impl ResultShape for VersionInfo {
    fn decode(record: &ResultRecord) -> Result<Self> {
        Ok(VersionInfo {
            version: record
                .results
                .get("version")
                .and_then(Value::as_string)
                .map(str::to_string),
        })
    }
}

/// An MI command descriptor: literal wire text plus result-shape marker.
///
/// Immutable once built. Construction never performs I/O and never fails
/// on well-formed arguments; argument validation is the caller's job.
#[derive(Debug, Clone)]
pub struct MiCommand<R: ResultShape> {
    operation: &'static str,
    args: Vec<String>,
    _shape: PhantomData<fn() -> R>,
}

impl<R: ResultShape> MiCommand<R> {
    fn new(operation: &'static str, args: Vec<String>) -> Self {
        MiCommand {
            operation,
            args,
            _shape: PhantomData,
        }
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// The exact text to transmit, without token prefix or newline.
    ///
    /// Arguments are ordered, space-separated and independently escaped;
    /// their semantics are not interpreted here.
    pub fn text(&self) -> String {
        let mut text = String::from(self.operation);
        for arg in &self.args {
            text.push(' ');
            text.push_str(&escape_arg(arg));
        }
        text
    }

    /// Decode the result record this command produced.
    pub fn decode(&self, record: &ResultRecord) -> Result<R> {
        if record.class == ResultClass::Error {
            let msg = record
                .results
                .get("msg")
                .and_then(Value::as_string)
                .unwrap_or("unknown error")
                .to_string();
            return Err(CommandError::Rejected(msg));
        }
        R::decode(record)
    }
}

/// Quote an argument when the MI token separation rule requires it.
fn escape_arg(arg: &str) -> String {
    let needs_quoting =
        arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\');
    if !needs_quoting {
        return arg.to_string();
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for ch in arg.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn numbers(array: &[u32]) -> Vec<String> {
    array.iter().map(u32::to_string).collect()
}

impl MiCommand<MiInfo> {
    // Run control -----------------------------------------------------

    pub fn exec_continue() -> Self {
        Self::new("-exec-continue", Vec::new())
    }

    pub fn exec_continue_all() -> Self {
        Self::new("-exec-continue", vec!["--all".into()])
    }

    pub fn exec_continue_group(group_id: &str) -> Self {
        Self::new(
            "-exec-continue",
            vec!["--thread-group".into(), group_id.into()],
        )
    }

    pub fn exec_interrupt() -> Self {
        Self::new("-exec-interrupt", Vec::new())
    }

    pub fn exec_interrupt_all() -> Self {
        Self::new("-exec-interrupt", vec!["--all".into()])
    }

    pub fn exec_interrupt_group(group_id: &str) -> Self {
        Self::new(
            "-exec-interrupt",
            vec!["--thread-group".into(), group_id.into()],
        )
    }

    pub fn exec_run() -> Self {
        Self::new("-exec-run", Vec::new())
    }

    pub fn exec_run_args(args: &[&str]) -> Self {
        Self::new("-exec-run", args.iter().map(|s| s.to_string()).collect())
    }

    pub fn exec_jump(location: &str) -> Self {
        Self::new("-exec-jump", vec![location.into()])
    }

    pub fn exec_return() -> Self {
        Self::new("-exec-return", Vec::new())
    }

    pub fn exec_return_value(value: &str) -> Self {
        Self::new("-exec-return", vec![value.into()])
    }

    // Stepping --------------------------------------------------------

    pub fn exec_step() -> Self {
        Self::exec_step_count(1)
    }

    pub fn exec_step_count(count: u32) -> Self {
        Self::new("-exec-step", vec![count.to_string()])
    }

    pub fn exec_step_instruction() -> Self {
        Self::exec_step_instruction_count(1)
    }

    pub fn exec_step_instruction_count(count: u32) -> Self {
        Self::new("-exec-step-instruction", vec![count.to_string()])
    }

    pub fn exec_next() -> Self {
        Self::exec_next_count(1)
    }

    pub fn exec_next_count(count: u32) -> Self {
        Self::new("-exec-next", vec![count.to_string()])
    }

    pub fn exec_next_instruction() -> Self {
        Self::exec_next_instruction_count(1)
    }

    pub fn exec_next_instruction_count(count: u32) -> Self {
        Self::new("-exec-next-instruction", vec![count.to_string()])
    }

    pub fn exec_finish() -> Self {
        Self::new("-exec-finish", Vec::new())
    }

    // Breakpoint maintenance ------------------------------------------

    pub fn break_delete(array: &[u32]) -> Self {
        Self::new("-break-delete", numbers(array))
    }

    pub fn break_enable(array: &[u32]) -> Self {
        Self::new("-break-enable", numbers(array))
    }

    pub fn break_disable(array: &[u32]) -> Self {
        Self::new("-break-disable", numbers(array))
    }

    pub fn break_condition(breakpoint: u32, condition: &str) -> Self {
        Self::new(
            "-break-condition",
            vec![breakpoint.to_string(), condition.into()],
        )
    }

    pub fn break_after(breakpoint: u32, ignore_count: u32) -> Self {
        Self::new(
            "-break-after",
            vec![breakpoint.to_string(), ignore_count.to_string()],
        )
    }

    pub fn break_commands(breakpoint: u32, commands: &[&str]) -> Self {
        let mut args = vec![breakpoint.to_string()];
        args.extend(commands.iter().map(|s| s.to_string()));
        Self::new("-break-commands", args)
    }

    // Session ---------------------------------------------------------

    pub fn file_exec_and_symbols(path: &str) -> Self {
        Self::new("-file-exec-and-symbols", vec![path.into()])
    }

    pub fn gdb_exit() -> Self {
        Self::new("-gdb-exit", Vec::new())
    }
}

impl MiCommand<BreakInsertInfo> {
    pub fn break_insert(location: &str) -> Self {
        Self::new("-break-insert", vec![location.into()])
    }

    pub fn break_insert_full(
        temporary: bool,
        hardware: bool,
        condition: Option<&str>,
        ignore_count: u32,
        location: &str,
        thread: Option<&str>,
        disabled: bool,
    ) -> Self {
        let mut args = Vec::new();
        if temporary {
            args.push("-t".to_string());
        }
        if hardware {
            args.push("-h".to_string());
        }
        if disabled {
            args.push("-d".to_string());
        }
        if let Some(condition) = condition {
            args.push("-c".to_string());
            args.push(condition.to_string());
        }
        if ignore_count > 0 {
            args.push("-i".to_string());
            args.push(ignore_count.to_string());
        }
        if let Some(thread) = thread {
            args.push("-p".to_string());
            args.push(thread.to_string());
        }
        args.push(location.to_string());
        Self::new("-break-insert", args)
    }

    pub fn break_watch(read: bool, write: bool, expression: &str) -> Self {
        let mut args = Vec::new();
        match (read, write) {
            (true, true) => args.push("-a".to_string()),
            (true, false) => args.push("-r".to_string()),
            _ => {} // plain write watchpoint
        }
        args.push(expression.to_string());
        Self::new("-break-watch", args)
    }
}

impl MiCommand<BreakListInfo> {
    pub fn break_list() -> Self {
        Self::new("-break-list", Vec::new())
    }
}

impl MiCommand<VersionInfo> {
    pub fn gdb_version() -> Self {
        Self::new("-gdb-version", Vec::new())
    }
}
