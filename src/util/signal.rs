use tokio::sync::watch;
use tracing::warn;

/// Resolves once the process receives Ctrl+C (or SIGTERM on unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "could not listen for Ctrl+C");
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "could not listen for SIGTERM");
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Broadcasts shutdown to background workers.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    #[must_use]
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until [`ShutdownTrigger::trigger`] is called or the
    /// trigger is dropped.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let (trigger, shutdown) = Shutdown::channel();
        let mut waiter = shutdown.clone();
        assert!(!shutdown.is_triggered());

        let handle = tokio::spawn(async move { waiter.wait().await });
        trigger.trigger();
        handle.await.unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_trigger_releases_waiters() {
        let (trigger, mut shutdown) = Shutdown::channel();
        drop(trigger);
        shutdown.wait().await;
    }
}
