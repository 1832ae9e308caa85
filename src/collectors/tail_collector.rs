use crate::error::CollectorError;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often to check whether the log file has appeared
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How a single `tail` run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// Subprocess closed its stdout
    Eof,
    /// Collector was asked to stop
    Stopped,
    /// Nobody is listening on the output channel any more
    ReceiverGone,
}

/// Follows an append-only log file and forwards each new line
///
/// Waits for the file to exist, then runs `tail -F -n 0` on it so that only
/// lines written after startup are seen and log rotation is followed by name.
/// The subprocess is restarted with exponential backoff if it exits.
pub struct TailCollector {
    /// File to follow
    path: PathBuf,
    /// Channel to send raw lines, handed to the background thread on start
    ///
    /// The thread owns the only sender, so the receiver sees a disconnect as
    /// soon as the thread ends for any reason.
    output_channel: Option<Sender<String>>,
    /// Interval between existence checks while waiting for the file
    poll_interval: Duration,
    /// Handle to the background thread
    thread_handle: Option<JoinHandle<()>>,
    /// Shared flag controlling the background thread
    running: Arc<AtomicBool>,
}

impl TailCollector {
    /// Create a collector for `path`
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::sync::mpsc;
    /// use poolwatch::collectors::TailCollector;
    ///
    /// let (tx, rx) = mpsc::channel();
    /// let mut collector = TailCollector::new("/var/log/nginx/access.log", tx);
    /// collector.start().unwrap();
    /// let first_line: String = rx.recv().unwrap();
    /// ```
    pub fn new(path: impl Into<PathBuf>, channel: Sender<String>) -> Self {
        Self {
            path: path.into(),
            output_channel: Some(channel),
            poll_interval: DEFAULT_POLL_INTERVAL,
            thread_handle: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start following the file on a background thread
    ///
    /// A collector can be started once. Starting it again after its thread has
    /// ended fails with `CollectorError::SourceClosed`.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(()); // Already running
        }
        let channel = self.output_channel.take().ok_or(CollectorError::SourceClosed)?;
        self.running.store(true, Ordering::SeqCst);

        let path = self.path.clone();
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;

        let handle = thread::Builder::new()
            .name("tail-collector".to_string())
            .spawn(move || {
                Self::collector_thread(path, channel, running, poll_interval);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CollectorError::IoError(e)
            })?;

        self.thread_handle = Some(handle);
        info!("TailCollector started for {}", self.path.display());
        Ok(())
    }

    /// Stop following and wait for the background thread to finish
    pub fn stop(&mut self) -> Result<(), CollectorError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| {
                CollectorError::SubprocessTerminated("Failed to join collector thread".to_string())
            })?;
        }

        info!("TailCollector stopped");
        Ok(())
    }

    /// Check if the collector is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Main collector thread function
    fn collector_thread(
        path: PathBuf,
        channel: Sender<String>,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        let mut restart_delay = Duration::from_secs(1);
        let max_delay = Duration::from_secs(60);
        let mut consecutive_failures = 0;
        const MAX_CONSECUTIVE_FAILURES: u32 = 5;

        while running.load(Ordering::SeqCst) {
            if !Self::wait_for_file(&path, &running, poll_interval) {
                break;
            }

            match Self::spawn_tail(&path) {
                Ok(mut child) => {
                    info!("Monitoring {}, waiting for requests", path.display());

                    let outcome = Self::process_tail_stream(&mut child, &channel, &running);

                    if let Err(e) = child.kill() {
                        debug!("Failed to kill tail subprocess: {}", e);
                    }
                    let _ = child.wait();

                    match outcome {
                        Ok(StreamEnd::Stopped) => break,
                        Ok(StreamEnd::ReceiverGone) => {
                            info!("Line receiver closed, stopping collector");
                            break;
                        }
                        Ok(StreamEnd::Eof) => {
                            warn!("tail subprocess exited");
                            consecutive_failures += 1;
                        }
                        Err(e) => {
                            error!("Error reading tail output: {}", e);
                            consecutive_failures += 1;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to spawn tail subprocess: {}", e);
                    consecutive_failures += 1;
                }
            }

            if !running.load(Ordering::SeqCst) {
                break;
            }

            let delay = if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                warn!(
                    "Too many consecutive failures ({}), entering degraded mode",
                    consecutive_failures
                );
                consecutive_failures = 0;
                restart_delay = Duration::from_secs(1);
                Duration::from_secs(60)
            } else {
                warn!(
                    "Restarting tail in {:?} (failure #{}/{})",
                    restart_delay, consecutive_failures, MAX_CONSECUTIVE_FAILURES
                );
                let delay = restart_delay;
                restart_delay = std::cmp::min(restart_delay * 2, max_delay);
                delay
            };

            Self::sleep_while_running(delay, &running);
        }

        running.store(false, Ordering::SeqCst);
        info!("Tail collector thread finished");
    }

    /// Block until `path` exists, polling every `interval`
    ///
    /// Returns `false` if the collector was stopped while waiting.
    fn wait_for_file(path: &Path, running: &AtomicBool, interval: Duration) -> bool {
        let mut announced = false;
        while !path.exists() {
            if !announced {
                info!("Waiting for log file: {}", path.display());
                announced = true;
            }
            if !Self::sleep_while_running(interval, running) {
                return false;
            }
        }
        if announced {
            info!("Log file found: {}", path.display());
        }
        running.load(Ordering::SeqCst)
    }

    /// Sleep in short slices so shutdown stays responsive
    ///
    /// Returns `false` if the collector was stopped during the sleep.
    fn sleep_while_running(duration: Duration, running: &AtomicBool) -> bool {
        let slice = Duration::from_millis(100);
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            if !running.load(Ordering::SeqCst) {
                return false;
            }
            let step = std::cmp::min(remaining, slice);
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        running.load(Ordering::SeqCst)
    }

    /// Spawn `tail -F -n 0 <path>`
    fn spawn_tail(path: &Path) -> Result<Child, CollectorError> {
        debug!("Spawning tail for {}", path.display());

        let mut child = Command::new("tail")
            .arg("-F")
            .args(["-n", "0"])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CollectorError::SubprocessSpawn(format!("tail: {}", e)))?;

        // Set stdout to non-blocking mode to avoid hanging on shutdown
        if let Some(ref mut stdout) = child.stdout {
            #[cfg(unix)]
            {
                use std::os::unix::io::AsRawFd;
                let fd = stdout.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                }
            }
        }

        Ok(child)
    }

    /// Forward complete lines from the subprocess until EOF, shutdown, or receiver loss
    fn process_tail_stream(
        child: &mut Child,
        channel: &Sender<String>,
        running: &AtomicBool,
    ) -> Result<StreamEnd, CollectorError> {
        use std::io::Read;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CollectorError::SubprocessTerminated("No stdout available".to_string()))?;

        let mut buffer: Vec<u8> = Vec::new();
        let mut temp_buf = [0u8; 4096];

        loop {
            if !running.load(Ordering::SeqCst) {
                debug!("Stopping tail processing due to shutdown signal");
                return Ok(StreamEnd::Stopped);
            }

            match stdout.read(&mut temp_buf) {
                Ok(0) => {
                    debug!("tail subprocess closed stdout");
                    return Ok(StreamEnd::Eof);
                }
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);

                    // Process complete lines; a partial line stays buffered
                    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                        let line = String::from_utf8_lossy(&raw[..raw.len() - 1])
                            .trim_end_matches('\r')
                            .to_string();

                        if line.trim().is_empty() {
                            continue;
                        }

                        if channel.send(line).is_err() {
                            return Ok(StreamEnd::ReceiverGone);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(CollectorError::IoError(e));
                }
            }
        }
    }
}

impl Drop for TailCollector {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::mpsc;
    use tempfile::NamedTempFile;

    fn cat(file: &NamedTempFile) -> Child {
        Command::new("cat")
            .arg(file.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn cat command")
    }

    #[test]
    fn test_tail_collector_creation() {
        let (tx, _rx) = mpsc::channel();
        let collector = TailCollector::new("/var/log/nginx/access.log", tx);
        assert!(!collector.is_running());
        assert_eq!(collector.path, PathBuf::from("/var/log/nginx/access.log"));
        assert_eq!(collector.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_process_stream_forwards_lines() {
        let (tx, rx) = mpsc::channel();
        let running = AtomicBool::new(true);

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{\"status\":200}}\n\n   \nnot json\r\n{{\"status\":502}}\n").unwrap();
        file.flush().unwrap();

        let mut child = cat(&file);
        let end = TailCollector::process_tail_stream(&mut child, &tx, &running).unwrap();
        assert_eq!(end, StreamEnd::Eof);

        let lines: Vec<String> = rx.try_iter().collect();
        assert_eq!(lines, vec!["{\"status\":200}", "not json", "{\"status\":502}"]);

        let _ = child.wait();
    }

    #[test]
    fn test_process_stream_holds_partial_line() {
        let (tx, rx) = mpsc::channel();
        let running = AtomicBool::new(true);

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "complete\npartial").unwrap();
        file.flush().unwrap();

        let mut child = cat(&file);
        TailCollector::process_tail_stream(&mut child, &tx, &running).unwrap();

        let lines: Vec<String> = rx.try_iter().collect();
        assert_eq!(lines, vec!["complete"]);

        let _ = child.wait();
    }

    #[test]
    fn test_process_stream_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let running = AtomicBool::new(true);

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "line").unwrap();
        file.flush().unwrap();

        let mut child = cat(&file);
        let end = TailCollector::process_tail_stream(&mut child, &tx, &running).unwrap();
        assert_eq!(end, StreamEnd::ReceiverGone);

        let _ = child.wait();
    }

    #[test]
    fn test_wait_for_file_returns_false_when_stopped() {
        let running = AtomicBool::new(false);
        assert!(!TailCollector::wait_for_file(
            Path::new("/nonexistent/poolwatch/access.log"),
            &running,
            Duration::from_millis(10)
        ));
    }

    #[test]
    fn test_stop_while_waiting_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut collector = TailCollector::new(dir.path().join("missing.log"), tx)
            .with_poll_interval(Duration::from_millis(20));

        collector.start().unwrap();
        assert!(collector.is_running());
        thread::sleep(Duration::from_millis(50));

        assert!(collector.stop().is_ok());
        assert!(!collector.is_running());
    }

    #[test]
    fn test_receiver_disconnects_when_thread_ends() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel::<String>();
        let mut collector = TailCollector::new(dir.path().join("missing.log"), tx)
            .with_poll_interval(Duration::from_millis(20));

        collector.start().unwrap();
        collector.stop().unwrap();

        // collector is still alive, but its sender went away with the thread
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(200)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
        assert!(matches!(collector.start(), Err(CollectorError::SourceClosed)));
    }

    #[test]
    #[cfg(unix)]
    fn test_follows_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "old line written before start\n").unwrap();

        let (tx, rx) = mpsc::channel();
        let mut collector =
            TailCollector::new(&path, tx).with_poll_interval(Duration::from_millis(20));
        collector.start().unwrap();

        // keep appending until tail has attached and forwards something
        let mut log = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        let mut received = None;
        for i in 0..50 {
            writeln!(log, "line-{}", i).unwrap();
            log.flush().unwrap();
            if let Ok(line) = rx.recv_timeout(Duration::from_millis(200)) {
                received = Some(line);
                break;
            }
        }

        collector.stop().unwrap();

        let line = received.expect("no line forwarded from followed file");
        assert!(line.starts_with("line-"), "unexpected line: {}", line);
    }
}
