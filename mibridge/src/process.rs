/// Debugger process management
///
/// Spawns the backend debugger with its machine interface enabled and
/// handles platform-specific interrupt delivery.

use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::{GdbError, Result};

pub struct GdbProcess {
    child: Child,
}

impl GdbProcess {
    /// Start the debugger with the MI interpreter.
    pub fn start(gdb_path: &str) -> Result<Self> {
        log::debug!("starting debugger process: {gdb_path}");

        let child = Command::new(gdb_path)
            .arg("--interpreter=mi2")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        log::debug!("debugger process started with PID: {:?}", child.id());

        Ok(GdbProcess { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> Option<tokio::process::ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<tokio::process::ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<tokio::process::ChildStderr> {
        self.child.stderr.take()
    }

    /// Deliver an interrupt to the debugger process. Used to halt a
    /// running inferior when the MI channel cannot accept commands.
    pub fn interrupt(&mut self) -> Result<()> {
        match self.id() {
            Some(pid) => {
                log::debug!("sending interrupt to debugger PID: {pid}");
                self.send_interrupt_signal(pid)
            }
            None => Err(GdbError::Closed),
        }
    }

    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    #[cfg(unix)]
    fn send_interrupt_signal(&self, pid: u32) -> Result<()> {
        let result = unsafe { libc::kill(pid as i32, libc::SIGINT) };
        if result != 0 {
            Err(GdbError::Signal(format!("failed to send SIGINT to {pid}")))
        } else {
            Ok(())
        }
    }

    #[cfg(windows)]
    fn send_interrupt_signal(&self, pid: u32) -> Result<()> {
        unsafe {
            use winapi::um::wincon::{GenerateConsoleCtrlEvent, CTRL_C_EVENT};

            let result = GenerateConsoleCtrlEvent(CTRL_C_EVENT, pid);
            if result == 0 {
                Err(GdbError::Signal(format!(
                    "failed to send ctrl event to {pid}"
                )))
            } else {
                Ok(())
            }
        }
    }

    #[cfg(not(any(windows, unix)))]
    fn send_interrupt_signal(&self, _pid: u32) -> Result<()> {
        Err(GdbError::Signal(
            "interrupt not supported on this platform".into(),
        ))
    }
}

impl Drop for GdbProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Install a console handler so the bridge survives the ctrl events it
/// sends to the debugger sharing its console.
#[cfg(windows)]
pub fn install_signal_protection() {
    unsafe {
        use winapi::shared::minwindef::{BOOL, DWORD, TRUE};
        use winapi::um::consoleapi::SetConsoleCtrlHandler;

        unsafe extern "system" fn ctrl_handler(ctrl_type: DWORD) -> BOOL {
            use winapi::um::wincon::{CTRL_BREAK_EVENT, CTRL_C_EVENT};

            match ctrl_type {
                CTRL_C_EVENT | CTRL_BREAK_EVENT => TRUE,
                _ => 0,
            }
        }

        if SetConsoleCtrlHandler(Some(ctrl_handler), TRUE) == 0 {
            log::warn!("failed to install console ctrl handler");
        }
    }
}

#[cfg(not(windows))]
pub fn install_signal_protection() {
    // Interrupts go to the debugger PID directly on other platforms.
}
