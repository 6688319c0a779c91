//! Explicit teardown handles.
//!
//! Every "attach" in the engine (text subscription, audio attachment)
//! returns a value implementing [`Disposable`]. Handles for one session are
//! collected in a [`TeardownList`] so interrupt and view teardown release
//! everything in one call, with no listener left behind across remounts.

/// A resource that can be released exactly once.
///
/// `dispose` must be idempotent: calling it on an already disposed handle
/// is a no-op.
pub trait Disposable: Send {
    /// Release the resource.
    fn dispose(&mut self);

    /// Short label for logs.
    fn label(&self) -> &'static str;
}

/// Ordered collection of disposables belonging to one session.
#[derive(Default)]
pub struct TeardownList {
    items: Vec<Box<dyn Disposable>>,
}

impl TeardownList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Box<dyn Disposable>) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Dispose every handle in registration order and empty the list.
    pub fn dispose_all(&mut self) {
        for mut item in self.items.drain(..) {
            tracing::trace!(resource = item.label(), "Disposing");
            item.dispose();
        }
    }
}

impl Drop for TeardownList {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

impl std::fmt::Debug for TeardownList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.items.iter().map(|i| i.label()))
            .finish()
    }
}
