//! Out-of-memory notification.

use std::cell::Cell;

use crate::api::site::Site;
use crate::sync::mutex::Mutex;

use super::report::HeapReport;
use super::sink::DiagnosticSink;

/// Details of an allocation the underlying allocator refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfMemory {
    /// Requested size in bytes.
    pub size: usize,

    /// Call-site of the request, when known.
    pub site: Option<Site>,
}

type Handler = Box<dyn Fn(&OutOfMemory) + Send + Sync>;

thread_local! {
    static IN_FAILURE_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running the failure hook.
pub(crate) struct HookGuard(());

impl HookGuard {
    /// Enter the failure hook, or `None` if this thread is already inside it.
    pub(crate) fn enter() -> Option<Self> {
        IN_FAILURE_HOOK.with(|flag| {
            if flag.replace(true) {
                None
            } else {
                Some(HookGuard(()))
            }
        })
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        IN_FAILURE_HOOK.with(|flag| flag.set(false));
    }
}

/// Holder for the registrable out-of-memory callback.
#[derive(Default)]
pub(crate) struct OomHooks {
    handler: Mutex<Option<Handler>>,
}

impl OomHooks {
    pub(crate) fn set<F>(&self, handler: F)
    where
        F: Fn(&OutOfMemory) + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Box::new(handler));
    }

    pub(crate) fn clear(&self) {
        *self.handler.lock() = None;
    }

    pub(crate) fn notify(&self, event: &OutOfMemory) {
        if let Some(ref handler) = *self.handler.lock() {
            handler(event);
        }
    }
}

/// Write the out-of-memory dump: header, standard report, oldest records.
pub(crate) fn write_failure_dump<const N: usize, const M: usize>(
    event: &OutOfMemory,
    report: &HeapReport<N, M>,
    sink: &dyn DiagnosticSink,
) {
    match event.site {
        Some(site) => sink.write_line(format_args!(
            "out of memory: requested={} bytes site={}",
            event.size, site
        )),
        None => sink.write_line(format_args!(
            "out of memory: requested={} bytes site=<unknown>",
            event.size
        )),
    }
    report.write_to(sink);
    report.report.write_oldest(sink);
}
