use std::{
    io,
    thread::{self, JoinHandle},
};

use log::{debug, error, info};
use tokio::sync::oneshot;

use crate::http::server::{ShutdownHandle, ShutdownReason};

/// Background thread that turns SIGINT/SIGTERM into a shutdown request.
///
/// Dropping the watcher stops the thread and drops its signal
/// listeners, so a server that exits for any reason leaves no
/// subscriptions behind. The process-wide handlers tokio installs on
/// first use stay in place though: after the watcher is gone, SIGINT and
/// SIGTERM are ignored instead of terminating the process.
pub(crate) struct SignalWatcher {
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SignalWatcher {
    pub fn spawn(shutdown: ShutdownHandle) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // listeners are registered before returning, so no signal is lost
        // between spawning and the first poll
        let signals = {
            let _ctx = runtime.enter();
            Signals::register()?
        };

        let (stop, stopped) = oneshot::channel();
        let thread = thread::Builder::new()
            .name("signal-watcher".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    tokio::select! {
                        name = signals.recv() => {
                            info!("received {name}");
                            shutdown.send(ShutdownReason::Signal(name));
                        }
                        _ = stopped => debug!("signal watcher stopped"),
                    }
                })
            })?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // the thread is already gone if a signal arrived
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("signal watcher thread panicked");
            }
        }
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                error!("failed to listen for Ctrl-C: {e}");
                std::future::pending().await
            }
        }
    }
}
