use std::ffi::OsString;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// A fully resolved process invocation. The parent environment is inherited
/// and `env` is layered on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn display_program(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Builds a piped command. With `own_group` the child leads a new process
    /// group so the whole tree can be signalled at once.
    pub fn to_command(&self, own_group: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            if own_group {
                cmd.process_group(0);
            }
        }
        #[cfg(not(unix))]
        let _ = own_group;
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Logs every line of a child stream, in order, until EOF.
pub async fn forward_lines<R>(reader: R, label: &'static str, kind: StreamKind)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match kind {
                StreamKind::Stdout => info!(target: "agent", source = label, "{line}"),
                StreamKind::Stderr => warn!(target: "agent", source = label, "{line}"),
            },
            Ok(None) => break,
            Err(err) => {
                debug!(event = "stream_read_error", source = label, error = %err);
                break;
            }
        }
    }
}

/// Force-kills `pid` and every descendant.
pub async fn kill_tree(pid: u32) -> bool {
    #[cfg(windows)]
    {
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        return match status {
            Ok(status) => status.success(),
            Err(err) => {
                warn!(event = "kill_failed", pid, error = %err);
                false
            }
        };
    }

    #[cfg(not(windows))]
    {
        let group = format!("-{pid}");
        if send_kill(&["-KILL", "--", &group]).await {
            return true;
        }
        send_kill(&["-KILL", &pid.to_string()]).await
    }
}

#[cfg(not(windows))]
async fn send_kill(args: &[&str]) -> bool {
    match Command::new("kill")
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(err) => {
            warn!(event = "kill_failed", error = %err);
            false
        }
    }
}

/// A helper process that runs until it exits or is stopped. Its output is
/// logged under `label`.
#[derive(Debug)]
pub struct ServiceHandle {
    label: &'static str,
    pid: Option<u32>,
    alive: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ServiceHandle {
    pub fn spawn(spec: &CommandSpec, label: &'static str) -> std::io::Result<Self> {
        let mut child = spec.to_command(true).spawn()?;
        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, label, StreamKind::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, label, StreamKind::Stderr));
        }
        let alive = Arc::new(AtomicBool::new(true));
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let alive_flag = alive.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Some(pid) = pid {
                        kill_tree(pid).await;
                    }
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            alive_flag.store(false, Ordering::SeqCst);
            match status {
                Ok(status) => info!(event = "service_exited", service = label, code = ?status.code()),
                Err(err) => warn!(event = "service_wait_failed", service = label, error = %err),
            }
        });
        info!(event = "service_started", service = label, pid = ?pid);
        Ok(Self {
            label,
            pid,
            alive,
            kill_tx: Some(kill_tx),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.kill_tx.is_some() && self.alive.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            debug!(event = "service_stop", service = self.label, pid = ?self.pid);
            let _ = kill_tx.send(());
        }
    }
}

/// Output of a short command run to completion.
#[derive(Debug, Clone)]
pub struct Captured {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub async fn run_captured(spec: &CommandSpec) -> std::io::Result<Captured> {
    let output = spec.to_command(false).output().await?;
    Ok(Captured {
        code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Decodes tool output that may be UTF-16LE (as `wsl.exe` prints it).
pub fn decode_output(bytes: &[u8]) -> String {
    let looks_utf16 = bytes.len() >= 2 && bytes.iter().skip(1).step_by(2).all(|b| *b == 0);
    if looks_utf16 {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units).replace('\u{feff}', "");
    }
    String::from_utf8_lossy(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_env_entries_win() {
        let spec = CommandSpec::new("agent")
            .envs([("A", "1")])
            .envs([("A", "2")]);
        assert_eq!(spec.env_value("A"), Some("2"));
        assert_eq!(spec.env_value("B"), None);
    }

    #[test]
    fn utf16_output_is_decoded() {
        let bytes: Vec<u8> = "NeuralOS\r\n"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        assert_eq!(decode_output(&bytes), "NeuralOS\r\n");
        assert_eq!(decode_output(b"Ubuntu\n"), "Ubuntu\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn service_stops_on_request() {
        let spec = CommandSpec::new("sh").args(["-c", "sleep 30"]);
        let mut service = ServiceHandle::spawn(&spec, "test-service").expect("spawn");
        assert!(service.is_running());
        service.stop();
        assert!(!service.is_running());
        service.stop();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captured_reports_exit_code() {
        let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let captured = run_captured(&spec).await.expect("run");
        assert_eq!(captured.code, Some(3));
        assert_eq!(String::from_utf8_lossy(&captured.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&captured.stderr), "err\n");
    }
}
