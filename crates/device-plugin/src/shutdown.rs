//! Process termination signals

use std::io;

use tokio::signal::unix::signal;
use tokio::signal::unix::Signal;
use tokio::signal::unix::SignalKind;

/// SIGTERM and SIGINT handlers
///
/// Once installed, a signal delivered before [`ShutdownSignals::recv`] is
/// awaited is kept and returned by the next call.
#[derive(Debug)]
pub struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// wait for the next signal, returns its name
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    #[test(tokio::test)]
    async fn signal_raised_before_waiting_is_not_lost() {
        let mut signals = ShutdownSignals::install().expect("install handlers");

        // SAFETY: raise only delivers SIGTERM to this process, which is now handled by tokio
        let ret = unsafe { libc::raise(libc::SIGTERM) };
        assert_eq!(ret, 0);

        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .expect("signal should be delivered");
        assert_eq!(received, "SIGTERM");
    }
}
