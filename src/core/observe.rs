//! Derived, deduplicated views over the state watch channels.
//!
//! `select` turns a watch over a whole container into a watch over any
//! projection of it, notifying only when the projected value actually
//! changes. Session flags, single-peer views and unread counts are all
//! built this way.

use tokio::sync::watch;

/// Derive a deduplicated watch channel by projecting `source`.
///
/// The forwarder task runs until the source closes or every derived
/// receiver is dropped. Must be called from within a tokio runtime.
pub fn select<S, P, F>(source: watch::Receiver<S>, project: F) -> watch::Receiver<P>
where
    S: Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&S) -> P + Send + 'static,
{
    let initial = project(&*source.borrow());
    let (tx, out) = watch::channel(initial);
    let mut source = source;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                changed = source.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = {
                        let snapshot = source.borrow_and_update();
                        project(&*snapshot)
                    };
                    tx.send_if_modified(|current| {
                        if *current == next {
                            false
                        } else {
                            *current = next;
                            true
                        }
                    });
                }
            }
        }
    });
    out
}
