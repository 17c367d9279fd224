use std::fmt;
use tokio::sync::watch;

use crate::concurrency::signal::{SignalRx, SignalTx, create_signal};

/// Process signals that abort a purge session and trigger the restore-and-exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSignal {
    Hangup,
    Interrupt,
    Terminate,
    BrokenPipe,
}

impl InterruptSignal {
    /// Returns the POSIX signal number.
    pub fn number(&self) -> i32 {
        match self {
            InterruptSignal::Hangup => 1,
            InterruptSignal::Interrupt => 2,
            InterruptSignal::BrokenPipe => 13,
            InterruptSignal::Terminate => 15,
        }
    }

    /// Exit status a shell reports for a process terminated by this signal.
    pub fn exit_status(&self) -> u8 {
        128 + self.number() as u8
    }
}

impl fmt::Display for InterruptSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterruptSignal::Hangup => "SIGHUP",
            InterruptSignal::Interrupt => "SIGINT",
            InterruptSignal::Terminate => "SIGTERM",
            InterruptSignal::BrokenPipe => "SIGPIPE",
        };

        f.write_str(name)
    }
}

/// Sending half of the shutdown channel, held by the signal listener.
#[derive(Debug, Clone)]
pub struct ShutdownTx(SignalTx<Option<InterruptSignal>>);

impl ShutdownTx {
    pub fn wrap(tx: SignalTx<Option<InterruptSignal>>) -> Self {
        Self(tx)
    }

    /// Requests the session to stop, recording which signal was received.
    pub fn shutdown(
        &self,
        signal: InterruptSignal,
    ) -> Result<(), watch::error::SendError<Option<InterruptSignal>>> {
        self.0.send(Some(signal))
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

pub type ShutdownRx = SignalRx<Option<InterruptSignal>>;

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = create_signal(None);
    (ShutdownTx::wrap(tx), rx)
}

/// Waits until a shutdown is requested and returns the signal that caused it.
///
/// Never resolves when every [`ShutdownTx`] has been dropped without a request, so it can
/// be raced against the session work unconditionally.
pub async fn wait_for_shutdown(shutdown_rx: &mut ShutdownRx) -> InterruptSignal {
    loop {
        if let Some(signal) = *shutdown_rx.borrow_and_update() {
            return signal;
        }

        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn exit_status_follows_shell_convention() {
        assert_eq!(InterruptSignal::Hangup.exit_status(), 129);
        assert_eq!(InterruptSignal::Interrupt.exit_status(), 130);
        assert_eq!(InterruptSignal::BrokenPipe.exit_status(), 141);
        assert_eq!(InterruptSignal::Terminate.exit_status(), 143);
    }

    #[tokio::test]
    async fn shutdown_sent_before_waiting_is_observed() {
        let (tx, mut rx) = create_shutdown_channel();
        tx.shutdown(InterruptSignal::Terminate).unwrap();

        assert_eq!(wait_for_shutdown(&mut rx).await, InterruptSignal::Terminate);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_never_resolves() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        let waited = tokio::time::timeout(Duration::from_secs(5), wait_for_shutdown(&mut rx)).await;
        assert!(waited.is_err());
    }
}
