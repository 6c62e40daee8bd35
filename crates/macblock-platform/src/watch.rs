//! Network-change notifications.
//!
//! On macOS, a dedicated thread runs a CFRunLoop subscribed to the dynamic
//! store keys that change when the default route or any service's DNS
//! changes, and forwards a wakeup over a channel. The reconcile loop itself
//! stays single-threaded; this thread shares nothing but the channel.

use tokio::sync::mpsc;

/// Receiving side of the network-change subscription.
pub struct NetworkWatcher {
    rx: mpsc::UnboundedReceiver<()>,
    // Keeps the channel open on platforms without a notification source.
    _tx: Option<mpsc::UnboundedSender<()>>,
}

impl NetworkWatcher {
    /// Subscribes to host network changes.
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        #[cfg(target_os = "macos")]
        {
            macos::spawn_store_thread(tx);
            Self { rx, _tx: None }
        }
        #[cfg(not(target_os = "macos"))]
        {
            // No notification bus here; the daemon's periodic tick covers it.
            Self { rx, _tx: Some(tx) }
        }
    }

    /// Waits for the next change notification. Pends forever if the
    /// subscription thread has gone away; the caller multiplexes this with
    /// timers and signals.
    pub async fn changed(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    /// Discards queued notifications so a burst coalesces into the pass
    /// that is about to run.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use system_configuration::core_foundation::array::CFArray;
    use system_configuration::core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
    use system_configuration::core_foundation::string::CFString;
    use system_configuration::dynamic_store::{
        SCDynamicStore, SCDynamicStoreBuilder, SCDynamicStoreCallBackContext,
    };
    use tokio::sync::mpsc::UnboundedSender;
    use tracing::{debug, warn};

    fn store_changed(
        _store: SCDynamicStore,
        changed_keys: CFArray<CFString>,
        tx: &mut UnboundedSender<()>,
    ) {
        debug!(changes = changed_keys.len(), "resolver state changed");
        // Receiver gone means the daemon is shutting down.
        let _ = tx.send(());
    }

    pub(super) fn spawn_store_thread(tx: UnboundedSender<()>) {
        let spawned = std::thread::Builder::new()
            .name("macblock-netwatch".to_string())
            .spawn(move || run_store_loop(tx));
        if let Err(e) = spawned {
            warn!(error = %e, "could not start network watcher; relying on periodic tick");
        }
    }

    fn run_store_loop(tx: UnboundedSender<()>) {
        let context = SCDynamicStoreCallBackContext {
            callout: store_changed,
            info: tx,
        };
        let store = SCDynamicStoreBuilder::new("macblock-netwatch")
            .callback_context(context)
            .build();

        let keys = CFArray::from_CFTypes(&[
            CFString::new("State:/Network/Global/IPv4"),
            CFString::new("State:/Network/Global/IPv6"),
        ]);
        let patterns = CFArray::from_CFTypes(&[CFString::new("State:/Network/Service/.*/DNS")]);
        if !store.set_notification_keys(&keys, &patterns) {
            warn!("could not subscribe to network-change notifications; relying on periodic tick");
            return;
        }

        let source = store.create_run_loop_source();
        let run_loop = CFRunLoop::get_current();
        run_loop.add_source(&source, unsafe { kCFRunLoopCommonModes });
        CFRunLoop::run_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn watcher_pends_rather_than_spinning() {
        let mut watcher = NetworkWatcher::spawn();
        let waited =
            tokio::time::timeout(Duration::from_millis(50), watcher.changed()).await;
        assert!(waited.is_err(), "changed() must pend without a notification");
    }
}
