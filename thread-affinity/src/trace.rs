//! Optional tracing spans around expensive work.
//!
//! The platform backend is resolved once when the [`Tracer`] is built. Callers
//! only see the [`Tracer`] and never deal with whether a backend exists.

use {
    log::{info, log_enabled, trace, Level},
    std::fmt,
};

/// A tracing backend able to report named spans.
pub trait TraceBackend: Send + Sync {
    /// Whether spans are currently being recorded.
    fn is_enabled(&self) -> bool;
    fn begin_section(&self, name: &str);
    /// Ends the most recently begun section.
    fn end_section(&self);
}

/// Backend that reports spans through the `log` facade at trace level.
#[derive(Debug, Default)]
pub struct LogTraceBackend;

impl TraceBackend for LogTraceBackend {
    fn is_enabled(&self) -> bool {
        log_enabled!(Level::Trace)
    }

    fn begin_section(&self, name: &str) {
        trace!("begin section {name}");
    }

    fn end_section(&self) {
        trace!("end section");
    }
}

#[cfg(target_os = "android")]
mod atrace {
    use {
        super::TraceBackend,
        std::ffi::{c_char, c_void, CStr, CString},
    };

    type BeginSectionFn = unsafe extern "C" fn(*const c_char);
    type EndSectionFn = unsafe extern "C" fn();
    type IsEnabledFn = unsafe extern "C" fn() -> bool;

    /// NDK `ATrace_*` functions resolved from `libandroid.so`.
    pub struct ATraceBackend {
        begin_section: BeginSectionFn,
        end_section: EndSectionFn,
        is_enabled: IsEnabledFn,
    }

    // safety: the ATrace functions are thread safe and the library handle is
    // never closed, so the function pointers stay valid
    unsafe impl Send for ATraceBackend {}
    unsafe impl Sync for ATraceBackend {}

    fn symbol(handle: *mut c_void, name: &CStr) -> Option<*mut c_void> {
        // safety: handle came from dlopen and name is NUL terminated
        let sym = unsafe { libc::dlsym(handle, name.as_ptr()) };
        (!sym.is_null()).then_some(sym)
    }

    impl ATraceBackend {
        pub fn load() -> Option<Self> {
            // safety: the library name is NUL terminated; the handle is kept
            // open for the lifetime of the process
            let handle =
                unsafe { libc::dlopen(c"libandroid.so".as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
            if handle.is_null() {
                return None;
            }

            let begin_section = symbol(handle, c"ATrace_beginSection")?;
            let end_section = symbol(handle, c"ATrace_endSection")?;
            let is_enabled = symbol(handle, c"ATrace_isEnabled")?;

            // safety: the symbols have these signatures in the NDK
            unsafe {
                Some(Self {
                    begin_section: std::mem::transmute::<*mut c_void, BeginSectionFn>(
                        begin_section,
                    ),
                    end_section: std::mem::transmute::<*mut c_void, EndSectionFn>(end_section),
                    is_enabled: std::mem::transmute::<*mut c_void, IsEnabledFn>(is_enabled),
                })
            }
        }
    }

    impl TraceBackend for ATraceBackend {
        fn is_enabled(&self) -> bool {
            // safety: resolved from libandroid.so in load()
            unsafe { (self.is_enabled)() }
        }

        fn begin_section(&self, name: &str) {
            let name = CString::new(name.replace('\0', "")).unwrap_or_default();
            // safety: resolved from libandroid.so in load(); name outlives the call
            unsafe { (self.begin_section)(name.as_ptr()) }
        }

        fn end_section(&self) {
            // safety: resolved from libandroid.so in load()
            unsafe { (self.end_section)() }
        }
    }
}

/// Tracing capability, selected once at startup.
#[derive(Default)]
pub enum Tracer {
    Available(Box<dyn TraceBackend>),
    #[default]
    Unavailable,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tracer::Available(_) => f.write_str("Tracer::Available"),
            Tracer::Unavailable => f.write_str("Tracer::Unavailable"),
        }
    }
}

impl Tracer {
    pub fn new(backend: impl TraceBackend + 'static) -> Self {
        Tracer::Available(Box::new(backend))
    }

    /// Resolves the platform tracing backend, if there is one.
    pub fn detect() -> Self {
        #[cfg(target_os = "android")]
        {
            if let Some(backend) = atrace::ATraceBackend::load() {
                return Tracer::new(backend);
            }
        }

        info!("Unable to load NDK tracing APIs");
        Tracer::Unavailable
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Tracer::Available(_))
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Tracer::Available(backend) => backend.is_enabled(),
            Tracer::Unavailable => false,
        }
    }

    /// Begins a section if a backend is available and enabled.
    ///
    /// Returns whether a section was begun; only then may
    /// [`Tracer::end_section`] be called for it.
    pub fn begin_section(&self, name: &str) -> bool {
        match self {
            Tracer::Available(backend) if backend.is_enabled() => {
                backend.begin_section(name);
                true
            }
            _ => false,
        }
    }

    pub fn end_section(&self) {
        if let Tracer::Available(backend) = self {
            backend.end_section();
        }
    }

    /// Begins a section that ends when the returned guard is dropped.
    pub fn scoped(&self, name: &str) -> ScopedTrace<'_> {
        ScopedTrace {
            tracer: self,
            is_tracing: self.begin_section(name),
        }
    }
}

/// Ends its section on drop, if one was begun.
#[must_use = "the section ends as soon as the guard is dropped"]
pub struct ScopedTrace<'a> {
    tracer: &'a Tracer,
    is_tracing: bool,
}

impl ScopedTrace<'_> {
    pub fn is_tracing(&self) -> bool {
        self.is_tracing
    }
}

impl Drop for ScopedTrace<'_> {
    fn drop(&mut self) {
        if self.is_tracing {
            self.tracer.end_section();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        std::sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        },
    };

    #[derive(Clone, Default)]
    pub(crate) struct RecordingBackend {
        pub(crate) enabled: Arc<AtomicBool>,
        pub(crate) events: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingBackend {
        pub(crate) fn enabled() -> Self {
            let backend = Self::default();
            backend.enabled.store(true, Ordering::Relaxed);
            backend
        }

        pub(crate) fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl TraceBackend for RecordingBackend {
        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::Relaxed)
        }

        fn begin_section(&self, name: &str) {
            self.events.lock().unwrap().push(format!("begin {name}"));
        }

        fn end_section(&self) {
            self.events.lock().unwrap().push("end".to_string());
        }
    }

    #[test]
    fn test_unavailable_is_noop() {
        let tracer = Tracer::Unavailable;
        assert!(!tracer.is_available());
        assert!(!tracer.is_enabled());
        assert!(!tracer.begin_section("work"));
        tracer.end_section();
        assert!(!tracer.scoped("work").is_tracing());
    }

    #[test]
    fn test_disabled_backend_does_not_begin() {
        let backend = RecordingBackend::default();
        let tracer = Tracer::new(backend.clone());
        assert!(tracer.is_available());
        assert!(!tracer.begin_section("work"));
        {
            let _guard = tracer.scoped("scoped");
        }
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_scoped_trace_ends_on_every_path() {
        fn early_return(tracer: &Tracer, bail: bool) -> Option<()> {
            let _guard = tracer.scoped("early");
            if bail {
                return None;
            }
            Some(())
        }

        let backend = RecordingBackend::enabled();
        let tracer = Tracer::new(backend.clone());
        assert_eq!(early_return(&tracer, true), None);
        assert_eq!(early_return(&tracer, false), Some(()));
        assert_eq!(
            backend.events(),
            vec!["begin early", "end", "begin early", "end"]
        );
    }

    #[test]
    fn test_guard_started_while_disabled_does_not_end() {
        let backend = RecordingBackend::default();
        let tracer = Tracer::new(backend.clone());
        let guard = tracer.scoped("late");
        backend.enabled.store(true, Ordering::Relaxed);
        drop(guard);
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_log_backend() {
        solana_logger::setup();
        let tracer = Tracer::new(LogTraceBackend);
        let enabled = tracer.is_enabled();
        assert_eq!(tracer.scoped("log").is_tracing(), enabled);
    }

    #[test]
    #[cfg(not(target_os = "android"))]
    fn test_detect_without_ndk() {
        assert!(!Tracer::detect().is_available());
    }
}
