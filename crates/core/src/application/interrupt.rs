// External interruption channel
// The hosting CLI forwards OS termination/interrupt signals through it

use tokio::sync::watch;

/// Interruption signal observed by a running job
#[derive(Clone)]
pub struct InterruptToken {
    rx: watch::Receiver<bool>,
}

impl InterruptToken {
    /// Wait for an interruption.
    /// Never resolves if the sender is dropped without interrupting.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Token that is never interrupted (tests, embedding without signal handling)
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // closed channel: wait() stays pending
        drop(tx);
        Self { rx }
    }
}

/// Interruption sender
pub struct InterruptSender {
    tx: watch::Sender<bool>,
}

impl InterruptSender {
    /// Interrupt every job watching this channel
    pub fn interrupt(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create an interruption channel
pub fn interrupt_channel() -> (InterruptSender, InterruptToken) {
    let (tx, rx) = watch::channel(false);
    (InterruptSender { tx }, InterruptToken { rx })
}
