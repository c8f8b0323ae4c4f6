// Unix signal handling for the sync loop

use crate::error::{Result, Vm2DhcpError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal as TokioSignal, SignalKind};

/// Signals the daemon reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivedSignal {
    Terminate,
    Interrupt,
    Hangup,
    /// Dump consumer statistics to the log
    User1,
}

impl ReceivedSignal {
    pub fn should_shutdown(self) -> bool {
        matches!(
            self,
            ReceivedSignal::Terminate | ReceivedSignal::Interrupt | ReceivedSignal::Hangup
        )
    }
}

/// Anything the daemon can wait on for signals
#[async_trait]
pub trait SignalSource: Send {
    /// Wait for the next signal; must be cancel safe
    async fn wait(&mut self) -> ReceivedSignal;
}

/// Wait out `interval`, handing every signal received meanwhile to
/// `on_signal`. Returns the signal that asked for shutdown, if any.
pub async fn sleep_through<S: SignalSource>(
    interval: Duration,
    signals: &mut S,
    mut on_signal: impl FnMut(ReceivedSignal),
) -> Option<ReceivedSignal> {
    let deadline = tokio::time::sleep(interval);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return None,

            sig = signals.wait() => {
                if sig.should_shutdown() {
                    return Some(sig);
                }
                on_signal(sig);
            }
        }
    }
}

/// Listens for SIGTERM, SIGINT, SIGHUP and SIGUSR1
pub struct SignalHandler {
    sigterm: TokioSignal,
    sigint: TokioSignal,
    sighup: TokioSignal,
    sigusr1: TokioSignal,
}

fn install(kind: SignalKind, name: &str) -> Result<TokioSignal> {
    signal(kind).map_err(|e| Vm2DhcpError::Io {
        source: e,
        context: format!("Failed to setup {} handler", name),
    })
}

impl SignalHandler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sighup: install(SignalKind::hangup(), "SIGHUP")?,
            sigusr1: install(SignalKind::user_defined1(), "SIGUSR1")?,
        })
    }
}

#[async_trait]
impl SignalSource for SignalHandler {
    async fn wait(&mut self) -> ReceivedSignal {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                ReceivedSignal::Terminate
            }
            _ = self.sigint.recv() => {
                tracing::info!("Received SIGINT");
                ReceivedSignal::Interrupt
            }
            _ = self.sighup.recv() => {
                tracing::info!("Received SIGHUP");
                ReceivedSignal::Hangup
            }
            _ = self.sigusr1.recv() => {
                tracing::info!("Received SIGUSR1");
                ReceivedSignal::User1
            }
        }
    }
}
