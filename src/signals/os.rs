/*!
 * OS Signal Escalation
 *
 * SIGINT/SIGTERM handling for the binary. The first signal requests a drain,
 * the second requests an abort. `fold` treats the drain as a cancel; `watch`
 * finishes the current entry on drain and cancels it on abort.
 */

use super::cancel::{CancelSource, CancelToken};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ShutdownTokens {
    /// First signal
    pub drain: CancelToken,
    /// Second signal
    pub abort: CancelToken,
}

/// Install SIGINT and SIGTERM listeners on the current runtime
#[cfg(unix)]
pub fn spawn_signal_listener() -> std::io::Result<ShutdownTokens> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let drain = CancelSource::new();
    let abort = CancelSource::new();
    let tokens = ShutdownTokens {
        drain: drain.token(),
        abort: abort.token(),
    };

    tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            };
            received += 1;
            if received == 1 {
                warn!(signal = name, "Shutdown requested, finishing current work (signal again to abort)");
                drain.cancel();
            } else {
                warn!(signal = name, "Second signal, aborting active run");
                drain.cancel();
                abort.cancel();
                break;
            }
        }
    });

    Ok(tokens)
}

#[cfg(not(unix))]
pub fn spawn_signal_listener() -> std::io::Result<ShutdownTokens> {
    let drain = CancelSource::new();
    let abort = CancelSource::new();
    let tokens = ShutdownTokens {
        drain: drain.token(),
        abort: abort.token(),
    };

    tokio::spawn(async move {
        let mut received = 0u32;
        while tokio::signal::ctrl_c().await.is_ok() {
            received += 1;
            drain.cancel();
            if received > 1 {
                abort.cancel();
                break;
            }
        }
    });

    Ok(tokens)
}
