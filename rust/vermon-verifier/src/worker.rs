// vermon-verifier: Verifier worker - one evaluator child per MFOTL spec

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::config::EvaluatorConfig;
use crate::error::{VerifierError, VerifierResult};
use crate::fact::Outcome;

/// Shape of an evaluation line the child prints when a time point is accepted.
const VERDICT_PATTERN: &str = r"^\s*@\d+(\.\d+)?\s+\(time point \d+\):";

struct Channels {
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<Outcome>,
    /// Verdicts owed from earlier caller-side waits that gave up; drained
    /// before pairing the next submission so verdict order stays aligned.
    stale: usize,
}

/// Supervises one evaluator subprocess bound to one spec.
///
/// Facts go in through a bounded ingress queue, verdicts come back on a
/// bounded egress queue in submission order. The child is spawned once and
/// never restarted: its temporal state over the trace would be lost.
pub struct VerifierWorker {
    name: String,
    channels: tokio::sync::Mutex<Option<Channels>>,
    failed: Arc<AtomicBool>,
    last_stderr: Arc<parking_lot::Mutex<Option<String>>>,
    join: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

impl VerifierWorker {
    /// Launch the evaluator child for `name` and start its I/O loop.
    ///
    /// Fails fast when the sig/formula files are missing or the child cannot
    /// be spawned; both conditions are fatal at startup.
    pub fn spawn(name: impl Into<String>, cfg: &EvaluatorConfig) -> VerifierResult<Self> {
        let name = name.into();
        cfg.check_spec(&name)?;

        let pattern = Regex::new(VERDICT_PATTERN)
            .map_err(|e| VerifierError::Config(format!("bad verdict pattern: {e}")))?;

        let mut child = Command::new(&cfg.binary)
            .arg("-sig")
            .arg(cfg.sig_path(&name))
            .arg("-formula")
            .arg(cfg.formula_path(&name))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VerifierError::Spawn {
                name: name.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            VerifierError::Config(format!("no stdin pipe for evaluator '{name}'"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            VerifierError::Config(format!("no stdout pipe for evaluator '{name}'"))
        })?;

        let failed = Arc::new(AtomicBool::new(false));
        let last_stderr = Arc::new(parking_lot::Mutex::new(None));

        if let Some(stderr) = child.stderr.take() {
            let name_for_stderr = name.clone();
            let sink = Arc::clone(&last_stderr);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(verifier = %name_for_stderr, stderr = %line, "evaluator stderr");
                    *sink.lock() = Some(line);
                }
            });
        }

        let (tx_in, rx_in) = mpsc::channel::<String>(cfg.queue_depth);
        let (tx_out, rx_out) = mpsc::channel::<Outcome>(cfg.queue_depth);

        let join = tokio::spawn(run_loop(RunLoop {
            name: name.clone(),
            child,
            stdin: Some(stdin),
            lines: BufReader::new(stdout).lines(),
            rx: rx_in,
            tx: tx_out,
            failed: Arc::clone(&failed),
            last_stderr: Arc::clone(&last_stderr),
            pattern,
            read_timeout: cfg.read_timeout,
            shutdown_grace: cfg.shutdown_grace,
        }));

        Ok(Self {
            name,
            channels: tokio::sync::Mutex::new(Some(Channels {
                tx: tx_in,
                rx: rx_out,
                stale: 0,
            })),
            failed,
            last_stderr,
            join: parking_lot::Mutex::new(Some(join)),
            shutdown_grace: cfg.shutdown_grace,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the evaluator child has died or its pipe broke. A failed
    /// worker stays in the pool; its submissions answer violated immediately.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Last stderr line the child produced, if any.
    pub fn last_stderr(&self) -> Option<String> {
        self.last_stderr.lock().clone()
    }

    /// Submit one fact line and wait up to `wait` for its verdict.
    ///
    /// The send/receive pair is serialized under the worker's own lock so
    /// concurrent callers cannot interleave their verdicts. A wait that
    /// elapses yields a conservative violated; the eventually-produced verdict
    /// is drained before the next pairing.
    pub async fn submit(&self, line: &str, wait: Duration) -> VerifierResult<Outcome> {
        let mut guard = self.channels.lock().await;
        let ch = guard
            .as_mut()
            .ok_or_else(|| VerifierError::ChannelClosed(self.name.clone()))?;

        while ch.stale > 0 {
            match ch.rx.try_recv() {
                Ok(_) => ch.stale -= 1,
                Err(_) => break,
            }
        }

        let mut framed = line.to_string();
        if !framed.ends_with('\n') {
            framed.push('\n');
        }
        ch.tx
            .send(framed)
            .await
            .map_err(|_| VerifierError::ChannelClosed(self.name.clone()))?;

        match timeout(wait, ch.rx.recv()).await {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => Err(VerifierError::ChannelClosed(self.name.clone())),
            Err(_) => {
                ch.stale += 1;
                warn!(verifier = %self.name, "verdict wait elapsed, assuming violation");
                Ok(Outcome::Violated)
            }
        }
    }

    /// Close the ingress queue and wait for the worker loop to reap its child.
    pub async fn shutdown(&self) {
        if let Some(ch) = self.channels.lock().await.take() {
            drop(ch);
        }
        let handle = self.join.lock().take();
        if let Some(handle) = handle {
            let grace = self.shutdown_grace + Duration::from_secs(1);
            if timeout(grace, handle).await.is_err() {
                warn!(verifier = %self.name, "worker loop did not stop within grace period");
            }
        }
    }
}

struct RunLoop {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<Outcome>,
    failed: Arc<AtomicBool>,
    last_stderr: Arc<parking_lot::Mutex<Option<String>>>,
    pattern: Regex,
    read_timeout: Duration,
    shutdown_grace: Duration,
}

async fn run_loop(mut rl: RunLoop) {
    while let Some(batch) = rl.rx.recv().await {
        let outcome = if rl.failed.load(Ordering::SeqCst) {
            Outcome::Violated
        } else {
            evaluate_once(&mut rl, &batch).await
        };
        if rl.tx.send(outcome).await.is_err() {
            break;
        }
    }

    // Ingress closed: signal EOF and give the child a bounded window to exit.
    if let Some(stdin) = rl.stdin.take() {
        drop(stdin);
    }
    match timeout(rl.shutdown_grace, rl.child.wait()).await {
        Ok(Ok(status)) => {
            debug!(verifier = %rl.name, ?status, "evaluator exited");
        }
        Ok(Err(e)) => {
            warn!(verifier = %rl.name, error = %e, "failed to reap evaluator");
        }
        Err(_) => {
            warn!(verifier = %rl.name, "evaluator ignored EOF, killing");
            let _ = rl.child.kill().await;
        }
    }
}

async fn evaluate_once(rl: &mut RunLoop, batch: &str) -> Outcome {
    let Some(stdin) = rl.stdin.as_mut() else {
        return Outcome::Violated;
    };

    let write = async {
        stdin.write_all(batch.as_bytes()).await?;
        stdin.flush().await
    };
    if let Err(e) = write.await {
        mark_failed(rl, &format!("stdin write failed: {e}"));
        return Outcome::Violated;
    }

    match timeout(rl.read_timeout, rl.lines.next_line()).await {
        Ok(Ok(Some(line))) => {
            if rl.pattern.is_match(&line) {
                Outcome::Satisfied
            } else {
                debug!(verifier = %rl.name, output = %line, "unexpected evaluator output");
                Outcome::Violated
            }
        }
        Ok(Ok(None)) => {
            mark_failed(rl, "stdout closed (evaluator exited)");
            Outcome::Violated
        }
        Ok(Err(e)) => {
            mark_failed(rl, &format!("stdout read failed: {e}"));
            Outcome::Violated
        }
        // Read timeout: conservatively violated, worker stays healthy.
        Err(_) => Outcome::Violated,
    }
}

fn mark_failed(rl: &RunLoop, reason: &str) {
    if !rl.failed.swap(true, Ordering::SeqCst) {
        let stderr = rl.last_stderr.lock().clone();
        error!(
            verifier = %rl.name,
            reason,
            stderr = stderr.as_deref().unwrap_or(""),
            "verifier worker failed; it will answer violated until restart"
        );
    }
}
