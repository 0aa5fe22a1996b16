//! 관리 대상 하위 프로세스
//!
//! [`ManagedProcess`]는 실행한 자식 프로세스 하나를 소유합니다. 감시 태스크가
//! 자식을 기다리고 종료를 `watch` 채널로 알리므로 여러 관찰자가 종료에 반응할 수
//! 있습니다 (스토어 실행기는 클라이언트를 닫음). 출력은 프로세스 이름을 붙여 한
//! 줄씩 로그로 전달됩니다.
//!
//! Unix에서는 자식이 별도 프로세스 그룹에서 실행되어 하네스에 보낸 터미널
//! 인터럽트가 전달되지 않으며, Linux에서는 하네스가 죽으면 SIGTERM을 받습니다.
//! 다른 플랫폼은 격리가 없으며 정리 단계의 [`ManagedProcess::stop`]에 의존합니다.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use flowtest_core::metrics::{LABEL_PROCESS, PROCESS_STARTS_TOTAL, PROCESS_STOPS_TOTAL};
use metrics::counter;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::SupervisorError;

/// SIGKILL 후 종료를 기다리는 시간
pub const KILL_WAIT: Duration = Duration::from_secs(5);

/// SIGTERM과 SIGKILL 사이 기본 유예 시간
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// 관리 대상 프로세스의 종료 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// 정상 종료 시 종료 코드
    pub code: Option<i32>,
    /// 사람이 읽는 상태 (`exit status: 0`, `signal: 15 (SIGTERM)`)
    pub description: String,
}

impl ProcessExit {
    fn unknown() -> Self {
        Self {
            code: None,
            description: "unknown (watcher gone)".to_owned(),
        }
    }
}

impl std::fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

/// 캡처한 자식 stdout 줄
pub type StdoutLines = Lines<BufReader<ChildStdout>>;

/// 실행할 프로세스 정의
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
    /// stdout을 로그로 전달하지 않고 호출 측에 남깁니다.
    pub capture_stdout: bool,
    pub stop_grace: Duration,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            capture_stdout: false,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// 감독 중인 (또는 종료된) 하위 프로세스
pub struct ManagedProcess {
    name: String,
    pid: Option<u32>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    kill_tx: Option<oneshot::Sender<()>>,
    stdout: Option<StdoutLines>,
    stop_grace: Duration,
    stopped: bool,
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl ManagedProcess {
    /// `spec`에 기술된 프로세스를 실행합니다.
    pub fn spawn(spec: ProcessSpec) -> Result<Self, SupervisorError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        isolate(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
            process: spec.name.clone(),
            reason: format!("{}: {e}", spec.program.display()),
        })?;
        let pid = child.id();
        counter!(PROCESS_STARTS_TOTAL, LABEL_PROCESS => spec.name.clone()).increment(1);
        info!(
            process = %spec.name,
            pid,
            program = %spec.program.display(),
            "process started"
        );

        let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        if !spec.capture_stdout
            && let Some(lines) = stdout.take()
        {
            forward_lines(spec.name.clone(), "stdout", lines);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(spec.name.clone(), "stderr", BufReader::new(stderr).lines());
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_child(spec.name.clone(), child, exit_tx, kill_rx));

        Ok(Self {
            name: spec.name,
            pid,
            exit_rx,
            kill_tx: Some(kill_tx),
            stdout,
            stop_grace: spec.stop_grace,
            stopped: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// 종료된 경우 종료 상태
    pub fn exit_status(&self) -> Option<ProcessExit> {
        self.exit_rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// 종료를 관찰하는 수신자
    pub fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_rx.clone()
    }

    /// 프로세스 종료까지 기다립니다.
    pub async fn wait_exit(&self) -> ProcessExit {
        wait_for_exit(&mut self.exit_rx.clone()).await
    }

    /// [`ProcessSpec::capture_stdout`]을 설정했고 아직 전달하지 않은 stdout
    pub fn stdout_mut(&mut self) -> Option<&mut StdoutLines> {
        self.stdout.as_mut()
    }

    /// 남은 stdout을 로그로 전달합니다.
    pub fn forward_stdout(&mut self) {
        if let Some(lines) = self.stdout.take() {
            forward_lines(self.name.clone(), "stdout", lines);
        }
    }

    /// 프로세스를 정지합니다: SIGTERM, 유예 시간 대기, 이후 SIGKILL.
    ///
    /// 여러 번 호출해도 안전하며, 이미 종료된 프로세스는 에러가 아닙니다.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        counter!(PROCESS_STOPS_TOTAL, LABEL_PROCESS => self.name.clone()).increment(1);

        if let Some(exit) = self.exit_status() {
            debug!(process = %self.name, status = %exit, "process already exited");
            return Ok(());
        }

        self.terminate();
        if let Ok(exit) = timeout(self.stop_grace, self.wait_exit()).await {
            info!(process = %self.name, status = %exit, "process stopped");
            return Ok(());
        }

        warn!(
            process = %self.name,
            grace_secs = self.stop_grace.as_secs(),
            "process still running after SIGTERM, sending SIGKILL"
        );
        self.kill();
        match timeout(KILL_WAIT, self.wait_exit()).await {
            Ok(exit) => {
                info!(process = %self.name, status = %exit, "process killed");
                Ok(())
            }
            Err(_) => Err(SupervisorError::Stop {
                process: self.name.clone(),
                reason: format!("still running {}s after SIGKILL", KILL_WAIT.as_secs()),
            }),
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        if let Some(pid) = self.pid
            && let Err(e) = send_signal(pid, false, libc::SIGTERM)
        {
            warn!(process = %self.name, error = %e, "failed to send SIGTERM");
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        self.kill();
    }

    fn kill(&mut self) {
        self.kill_group();
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        if let Some(pid) = self.pid
            && let Err(e) = send_signal(pid, true, libc::SIGKILL)
        {
            warn!(process = %self.name, error = %e, "failed to send SIGKILL");
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if !self.stopped && self.is_running() {
            warn!(process = %self.name, "process dropped without stop, killing");
            self.kill();
        }
    }
}

/// [`ManagedProcess::exit_watch`]로 얻은 수신자로 종료를 기다립니다.
pub async fn wait_for_exit(rx: &mut watch::Receiver<Option<ProcessExit>>) -> ProcessExit {
    match rx.wait_for(Option::is_some).await {
        Ok(exit) => {
            let exit: Option<ProcessExit> = (*exit).clone();
            exit.unwrap_or_else(ProcessExit::unknown)
        }
        Err(_) => ProcessExit::unknown(),
    }
}

async fn watch_child(
    name: String,
    mut child: Child,
    exit_tx: watch::Sender<Option<ProcessExit>>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // 명시적 kill 요청 또는 소유자 drop
        _ = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                debug!(process = %name, error = %e, "start_kill failed");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => ProcessExit {
            code: status.code(),
            description: status.to_string(),
        },
        Err(e) => ProcessExit {
            code: None,
            description: format!("wait failed: {e}"),
        },
    };
    debug!(process = %name, status = %exit, "process exited");
    exit_tx.send_replace(Some(exit));
}

/// `lines`의 각 줄을 로그 이벤트로 다시 내보냅니다.
pub fn forward_lines<R>(process: String, stream: &'static str, mut lines: Lines<BufReader<R>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => info!(process = %process, stream, "{line}"),
                Ok(None) => break,
                Err(e) => {
                    debug!(process = %process, stream, error = %e, "output stream closed");
                    break;
                }
            }
        }
    });
}

#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    cmd.process_group(0);
    terminate_with_parent(cmd);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

#[cfg(target_os = "linux")]
fn terminate_with_parent(cmd: &mut Command) {
    // SAFETY: 클로저는 fork와 exec 사이에 실행됨. prctl(2)는
    // async-signal-safe이며 부모 메모리를 건드리지 않음
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn terminate_with_parent(_cmd: &mut Command) {}

/// `pid`에 `signal`을 보냅니다. `group`이면 프로세스 그룹 전체에 보냅니다.
/// 이미 없는 프로세스는 에러가 아닙니다.
#[cfg(unix)]
fn send_signal(pid: u32, group: bool, signal: libc::c_int) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let target = if group { -pid } else { pid };
    // SAFETY: kill(2)는 포인터를 받지 않음. 오래된 pid는 기껏해야 ESRCH
    let rc = unsafe { libc::kill(target, signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// `pid` 프로세스가 아직 존재하는지 여부
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: 시그널 0의 kill(2)은 존재 여부만 확인함
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
