use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

struct Shared {
    closed: AtomicBool,
    cancelled: AtomicBool,

    waited: AtomicU64,
    wakers: Mutex<HashMap<u64, Waker>>,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.waited.fetch_add(1, Ordering::SeqCst)
    }

    fn wake_all(&self) {
        self.wakers
            .lock()
            .expect("lock waker map success")
            .drain()
            .for_each(|(_key, waker)| waker.wake());
    }
}

pub struct Trigger {
    shared: Arc<Shared>,
}

impl Trigger {
    /// Cancel all associated tripwire, make them immediately resolved.
    pub fn cancel(self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.cancelled.store(true, Ordering::SeqCst);

        self.shared.wake_all();
    }

    pub fn disable(self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.wake_all();
    }
}

pub struct Tripwire {
    shared: Arc<Shared>,
    id: u64,
}

impl Clone for Tripwire {
    fn clone(&self) -> Self {
        let shared = self.shared.clone();
        let id = shared.next_id();

        Self { shared, id }
    }
}

impl Drop for Tripwire {
    fn drop(&mut self) {
        self.shared
            .wakers
            .lock()
            .expect("lock waker map success")
            .remove(&self.id);
    }
}

impl Future for Tripwire {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.shared.cancelled.load(Ordering::SeqCst) {
            return Poll::Ready(());
        }

        if self.shared.closed.load(Ordering::SeqCst) {
            return Poll::Ready(());
        }

        self.shared
            .wakers
            .lock()
            .expect("lock waker map success")
            .insert(self.id, cx.waker().clone());

        Poll::Pending
    }
}

impl Tripwire {
    pub fn new() -> (Trigger, Tripwire) {
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            wakers: Mutex::new(Default::default()),
            waited: AtomicU64::new(0),
        });

        (
            Trigger {
                shared: shared.clone(),
            },
            Tripwire {
                id: shared.next_id(),
                shared,
            },
        )
    }

    pub fn closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}
