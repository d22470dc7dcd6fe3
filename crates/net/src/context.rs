use std::io;
use std::thread::{self, JoinHandle};

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

/// A single-threaded tokio runtime driven by its own OS thread.
///
/// All socket work of one server or client runs on this thread. Stopping the
/// context drops every task still running on it, which closes their sockets.
pub struct ExecutionContext {
    handle: Handle,
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ExecutionContext {
    pub fn start(name: &str) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
            })?;

        log::debug!("Execution context '{}' started", name);

        Ok(Self {
            handle,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Idempotent. Must not be called from the context's own thread.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            let name = thread.thread().name().unwrap_or("unnamed").to_string();
            if thread.join().is_err() {
                log::error!("Execution context '{}' panicked", name);
            } else {
                log::debug!("Execution context '{}' stopped", name);
            }
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_runs_spawned_tasks() {
        let context = ExecutionContext::start("test-io").unwrap();
        let (tx, rx) = mpsc::channel();

        context.handle().spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tx.send(std::thread::current().name().map(str::to_string))
                .unwrap();
        });

        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name.as_deref(), Some("test-io"));
    }

    #[test]
    fn test_stop_is_idempotent_and_cancels_tasks() {
        let mut context = ExecutionContext::start("test-stop").unwrap();
        let (tx, rx) = mpsc::channel::<()>();

        context.handle().spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = tx.send(());
        });

        context.stop();
        context.stop();
        assert!(!context.is_running());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
