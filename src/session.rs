//! one detection session: credentials, cancellation and the detector

use crate::{
    context::ProbeContext,
    detect::{DetectOptions, Detection, Detector, OpenedArchive},
    stream::StreamHandle,
    utils, Result,
};
use std::{
    path::Path,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread,
    time::Duration,
};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub password: Option<String>,
    /// prompt on the terminal the first time a format needs a password
    pub ask_password: bool,
    pub resolve_sub_streams: bool,
    pub max_sub_stream_mb: u64,
    /// cancel detection after this long
    pub timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            password: None,
            ask_password: false,
            resolve_sub_streams: true,
            max_sub_stream_mb: DetectOptions::default().sub_stream_memory_limit / MIB,
            timeout: None,
        }
    }
}

pub struct Session {
    ctx: Arc<ProbeContext>,
    detector: Detector,
    timeout: Option<Duration>,
}

impl Session {
    pub fn new(options: &SessionOptions) -> Self {
        let mut ctx = ProbeContext::new();
        if let Some(password) = &options.password {
            ctx = ctx.with_password(password.clone());
        }
        if options.ask_password {
            ctx = ctx.with_password_provider(|| utils::prompt_line("password"));
        }

        let detector = Detector::new().with_options(DetectOptions {
            resolve_sub_streams: options.resolve_sub_streams,
            sub_stream_memory_limit: options.max_sub_stream_mb.saturating_mul(MIB),
        });

        Self {
            ctx: Arc::new(ctx),
            detector,
            timeout: options.timeout,
        }
    }

    pub fn context(&self) -> &Arc<ProbeContext> {
        &self.ctx
    }

    /// Detect and open the archive at `path`; `None` when cancelled
    pub fn open(&self, path: &Path) -> Result<Option<OpenedArchive>> {
        let stream = StreamHandle::open(path)?;
        log::debug!("opened {} ({} bytes)", path.display(), stream.len()?);

        let _watchdog = self.timeout.map(|timeout| Watchdog::start(&self.ctx, timeout));
        match self.detector.detect(&stream, &self.ctx)? {
            Detection::Accepted(opened) => Ok(Some(opened)),
            Detection::Cancelled => Ok(None),
        }
    }
}

/// Cancels the context when the timeout expires before it is dropped
struct Watchdog {
    _disarm: mpsc::Sender<()>,
}

impl Watchdog {
    fn start(ctx: &Arc<ProbeContext>, timeout: Duration) -> Self {
        let (disarm, disarmed) = mpsc::channel::<()>();
        let ctx = Arc::clone(ctx);
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = disarmed.recv_timeout(timeout) {
                log::debug!("timeout of {timeout:?} expired, cancelling detection");
                ctx.cancel();
            }
        });
        Self { _disarm: disarm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_options_match_detector() {
        let options = SessionOptions::default();
        assert!(options.resolve_sub_streams);
        assert_eq!(options.max_sub_stream_mb, 256);
    }

    #[test]
    fn test_watchdog_cancels_after_timeout() {
        let ctx = Arc::new(ProbeContext::new());
        let _watchdog = Watchdog::start(&ctx, Duration::from_millis(10));
        for _ in 0..200 {
            if ctx.is_cancelled() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_dropped_watchdog_never_cancels() {
        let ctx = Arc::new(ProbeContext::new());
        drop(Watchdog::start(&ctx, Duration::from_millis(50)));
        thread::sleep(Duration::from_millis(150));
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_open_text_file_is_unrecognized() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"just some notes, not an archive\n")?;

        let session = Session::new(&SessionOptions::default());
        let err = session.open(file.path()).unwrap_err();
        assert!(matches!(err, crate::Error::IncorrectFormat));
        Ok(())
    }
}
