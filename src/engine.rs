//! Process-wide lifecycle of the validation engine.
//!
//! libxml2 keeps parser state and builtin schema types in process globals, so
//! the engine is a state machine over those globals: `init` and `cleanup`
//! transition it, every other operation first checks that it is initialized.
//!
//! Each `init` opens a new generation. Handles remember the generation they
//! were created in and are rejected once it has ended, because `cleanup`
//! frees builtin types that compiled schemas point into. Operations hold
//! `in_flight` for reading; `cleanup` takes it for writing and so waits for
//! them to finish.
//!
//! A single [`Engine::global`] instance backs the free functions at the crate
//! root; tests build their own engines over a fake [`NativeRuntime`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{LifecycleError, Result};
use crate::handle::{DocumentHandle, SchemaHandle};
use crate::libxml2::{self, Libxml2Runtime, NativeRuntime, SchemaSource};
use crate::options::Options;
use crate::reclaim::Reclaimer;

static GLOBAL: LazyLock<Engine> = LazyLock::new(Engine::new);

/// Generations are unique across engines; 0 means "not initialized".
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

pub struct Engine {
    runtime: Arc<dyn NativeRuntime>,
    generation: AtomicU64,
    in_flight: RwLock<()>,
    /// Serializes init/cleanup/reset_reclaim and owns the running ticker.
    transitions: Mutex<Option<Reclaimer>>,
    /// libxml2 schema parsing is not thread-safe.
    compile_lock: Mutex<()>,
    ticks: Arc<AtomicU64>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("initialized", &self.is_initialized())
            .field("reclaim_ticks", &self.reclaim_ticks())
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An uninitialized engine over libxml2.
    pub fn new() -> Self {
        Self::with_runtime(Arc::new(Libxml2Runtime))
    }

    pub fn with_runtime(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self {
            runtime,
            generation: AtomicU64::new(0),
            in_flight: RwLock::new(()),
            transitions: Mutex::new(None),
            compile_lock: Mutex::new(()),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The process-wide engine used by the crate-level functions.
    pub fn global() -> &'static Engine {
        &GLOBAL
    }

    /// Initialize the native engine without memory reclamation.
    pub fn init(&self) -> Result<()> {
        self.init_with(None)
    }

    /// Initialize the native engine and trim native memory every `every`.
    ///
    /// A zero interval starts no ticker.
    pub fn init_with_reclaim(&self, every: Duration) -> Result<()> {
        self.init_with(Some(every))
    }

    /// Initialize with the reclamation interval of a loaded configuration.
    pub fn init_from_config(&self, config: &EngineConfig) -> Result<()> {
        self.init_with(config.reclaim_interval())
    }

    fn init_with(&self, every: Option<Duration>) -> Result<()> {
        let mut reclaimer = self.lock_transitions();
        if self.is_initialized() {
            return Err(LifecycleError::AlreadyInitialized.into());
        }

        self.runtime.init();

        let ticker = match every.filter(|d| !d.is_zero()) {
            Some(every) => match self.start_reclaimer(every) {
                Ok(ticker) => Some(ticker),
                Err(e) => {
                    self.runtime.cleanup();
                    return Err(e);
                }
            },
            None => None,
        };
        *reclaimer = ticker;

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::SeqCst);
        self.generation.store(generation, Ordering::SeqCst);
        info!(
            generation,
            reclaim_interval_ms = every.map(|d| d.as_millis() as u64),
            "xsd engine initialized"
        );
        Ok(())
    }

    /// Stop reclamation and release native global caches.
    ///
    /// A no-op on an engine that is not initialized. Waits for running
    /// operations; handles created before cleanup are rejected afterwards,
    /// even after a new `init`.
    pub fn cleanup(&self) {
        let mut reclaimer = self.lock_transitions();
        if !self.is_initialized() {
            debug!("cleanup on an uninitialized engine ignored");
            return;
        }

        {
            let _exclusive = self
                .in_flight
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            self.generation.store(0, Ordering::SeqCst);
        }
        if let Some(ticker) = reclaimer.take() {
            ticker.stop();
        }
        self.runtime.cleanup();
        info!("xsd engine cleaned up");
    }

    /// Replace the running reclamation ticker; `None` or zero stops it.
    pub fn reset_reclaim(&self, every: Option<Duration>) -> Result<()> {
        let mut reclaimer = self.lock_transitions();
        if !self.is_initialized() {
            return Err(LifecycleError::NotInitialized.into());
        }

        if let Some(ticker) = reclaimer.take() {
            ticker.stop();
        }
        if let Some(every) = every.filter(|d| !d.is_zero()) {
            *reclaimer = Some(self.start_reclaimer(every)?);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != 0
    }

    /// Interval of the running ticker, if any.
    pub fn reclaim_interval(&self) -> Option<Duration> {
        self.lock_transitions().as_ref().map(Reclaimer::interval)
    }

    /// Number of reclamation ticks run since this engine was created.
    pub fn reclaim_ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Compile a schema from a file path or URL; includes and imports are
    /// resolved relative to it.
    pub fn new_schema_from_url(&self, url: &str, options: Options) -> Result<SchemaHandle> {
        self.compile(SchemaSource::Url(url), options)
    }

    /// Compile a schema from an in-memory buffer.
    pub fn new_schema_from_buffer(&self, xsd: &[u8], options: Options) -> Result<SchemaHandle> {
        self.compile(SchemaSource::Buffer(xsd), options)
    }

    pub fn new_document_from_buffer(&self, xml: &[u8], options: Options) -> Result<DocumentHandle> {
        let (_running, generation) = self.enter()?;
        DocumentHandle::parse(xml, options, generation)
    }

    /// Validate a parsed document against a compiled schema.
    ///
    /// Safe to call concurrently with the same schema and different documents.
    pub fn validate(
        &self,
        schema: &SchemaHandle,
        document: &DocumentHandle,
        options: Options,
    ) -> Result<()> {
        let (_running, generation) = self.enter()?;
        let schema = schema
            .live_ptr(generation)
            .ok_or(LifecycleError::SchemaNotInitialized)?;
        let document = document
            .live_ptr(generation)
            .ok_or(LifecycleError::DocumentNotInitialized)?;
        libxml2::validate_document(document, schema, options)
    }

    /// Parse and validate one payload; the document is freed before returning.
    pub fn validate_buffer(&self, schema: &SchemaHandle, xml: &[u8], options: Options) -> Result<()> {
        let (_running, generation) = self.enter()?;
        let schema = schema
            .live_ptr(generation)
            .ok_or(LifecycleError::SchemaNotInitialized)?;
        let parsed = DocumentHandle::parse(xml, options, generation)?;
        let document = parsed
            .live_ptr(generation)
            .ok_or(LifecycleError::DocumentNotInitialized)?;
        libxml2::validate_document(document, schema, options)
    }

    fn compile(&self, source: SchemaSource<'_>, options: Options) -> Result<SchemaHandle> {
        let (_running, generation) = self.enter()?;
        let _guard = self
            .compile_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        SchemaHandle::compile(source, options, generation)
    }

    /// Register a running operation in the current generation.
    fn enter(&self) -> Result<(RwLockReadGuard<'_, ()>, u64)> {
        let running = self
            .in_flight
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match self.generation.load(Ordering::SeqCst) {
            0 => Err(LifecycleError::NotInitialized.into()),
            generation => Ok((running, generation)),
        }
    }

    fn start_reclaimer(&self, every: Duration) -> Result<Reclaimer> {
        Reclaimer::start(every, Arc::clone(&self.runtime), Arc::clone(&self.ticks))
    }

    fn lock_transitions(&self) -> MutexGuard<'_, Option<Reclaimer>> {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Initialize the process-wide engine.
pub fn init() -> Result<()> {
    Engine::global().init()
}

/// Initialize the process-wide engine with periodic memory reclamation.
pub fn init_with_reclaim(every: Duration) -> Result<()> {
    Engine::global().init_with_reclaim(every)
}

/// Clean up the process-wide engine.
pub fn cleanup() {
    Engine::global().cleanup()
}

pub fn new_schema_from_url(url: &str, options: Options) -> Result<SchemaHandle> {
    Engine::global().new_schema_from_url(url, options)
}

pub fn new_schema_from_buffer(xsd: &[u8], options: Options) -> Result<SchemaHandle> {
    Engine::global().new_schema_from_buffer(xsd, options)
}

pub fn new_document_from_buffer(xml: &[u8], options: Options) -> Result<DocumentHandle> {
    Engine::global().new_document_from_buffer(xml, options)
}

pub fn validate(schema: &SchemaHandle, document: &DocumentHandle, options: Options) -> Result<()> {
    Engine::global().validate(schema, document, options)
}

pub fn validate_buffer(schema: &SchemaHandle, xml: &[u8], options: Options) -> Result<()> {
    Engine::global().validate_buffer(schema, xml, options)
}
