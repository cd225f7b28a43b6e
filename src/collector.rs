//! Diagnostic collection from libxml2 error callbacks.
//!
//! libxml2 reports problems through callbacks that fire synchronously while a
//! native call is running. A [`DiagnosticSink`] lives on the caller's stack for
//! exactly that call; [`collect_native_error`] is the `extern "C"` trampoline
//! handed to libxml2 together with a pointer to the sink. Two sinks exist:
//!
//! - [`TextSink`] concatenates records into one message (schema compilation,
//!   document parsing).
//! - [`StructuredSink`] keeps every record as a [`Diagnostic`] in emission
//!   order (validation).
//!
//! The node attached to a validation record is only valid while the callback
//! runs, so its ancestor path is computed inside the callback.

use std::borrow::Cow;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::ptr;

use libc::{c_char, c_void};

use crate::diagnostic::{Diagnostic, Severity};
use crate::libxml2::{
    XML_DOCUMENT_NODE, XML_HTML_DOCUMENT_NODE, XmlError, XmlNode, XmlStructuredErrorFunc,
    __xmlStructuredError, __xmlStructuredErrorContext, xmlSetStructuredErrorFunc,
};

/// Initial capacity of a [`TextSink`] buffer in bytes.
pub const TEXT_INITIAL_CAPACITY: usize = 1024;

/// Initial capacity of a [`StructuredSink`].
pub const STRUCTURED_INITIAL_CAPACITY: usize = 2;

/// Receiver of native diagnostics for the duration of one native call.
pub trait DiagnosticSink {
    fn collect(&mut self, diagnostic: Diagnostic);
}

/// Concatenates diagnostics into a single message, in arrival order.
#[derive(Debug)]
pub struct TextSink {
    buf: String,
}

impl TextSink {
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(TEXT_INITIAL_CAPACITY),
        }
    }

    /// Append a fragment of any length.
    ///
    /// The buffer grows to exactly the required size when the fragment does
    /// not fit, so nothing is ever truncated.
    pub fn push_fragment(&mut self, fragment: &str) {
        let required = self.buf.len() + fragment.len();
        if required > self.buf.capacity() {
            self.buf.reserve_exact(required - self.buf.len());
        }
        self.buf.push_str(fragment);
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// The aggregated text with trailing newlines trimmed.
    pub fn finish(mut self) -> String {
        let trimmed = self.buf.trim_end_matches(['\n', '\r']).len();
        self.buf.truncate(trimmed);
        self.buf
    }
}

impl Default for TextSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for TextSink {
    fn collect(&mut self, diagnostic: Diagnostic) {
        let fragment = if diagnostic.line > 0 {
            format!("line {}: {}\n", diagnostic.line, diagnostic.message)
        } else {
            format!("{}\n", diagnostic.message)
        };
        self.push_fragment(&fragment);
    }
}

/// Keeps every diagnostic, in the order the native engine emitted them.
#[derive(Debug)]
pub struct StructuredSink {
    diagnostics: Vec<Diagnostic>,
}

impl StructuredSink {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::with_capacity(STRUCTURED_INITIAL_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl Default for StructuredSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for StructuredSink {
    fn collect(&mut self, diagnostic: Diagnostic) {
        // Vec doubles its capacity on overflow: amortized O(1) append
        self.diagnostics.push(diagnostic);
    }
}

/// Structured error callback handed to libxml2.
///
/// # Safety
///
/// `user_data` must be null or point to a live `S` not otherwise borrowed for
/// the duration of the callback. `error` must be null or point to a record
/// whose node, if any, belongs to a live document.
pub(crate) unsafe extern "C" fn collect_native_error<S: DiagnosticSink>(
    user_data: *mut c_void,
    error: *const XmlError,
) {
    if user_data.is_null() || error.is_null() {
        return;
    }

    let sink = unsafe { &mut *(user_data as *mut S) };
    let diagnostic = unsafe { diagnostic_from_native(&*error) };
    sink.collect(diagnostic);
}

/// Structured error callback that drops everything.
unsafe extern "C" fn discard_native_error(_user_data: *mut c_void, _error: *const XmlError) {}

/// Convert one native record, walking the offending node's ancestors.
///
/// # Safety
///
/// Pointers inside `error` must be null or valid for reads.
pub(crate) unsafe fn diagnostic_from_native(error: &XmlError) -> Diagnostic {
    let message = unsafe { lossy(error.message) };
    let node = error.node as *const XmlNode;

    let (node_name, path) = if node.is_null() {
        (String::new(), String::new())
    } else {
        unsafe {
            (
                lossy((*node).name as *const c_char).into_owned(),
                ancestor_path(node),
            )
        }
    };

    Diagnostic {
        code: error.code,
        message: message.trim_end_matches(['\n', '\r']).to_string(),
        severity: Severity::from_level(error.level),
        line: u32::try_from(error.line).unwrap_or(0),
        node_name,
        path,
    }
}

/// Slash-joined names from the document root down to `node`.
///
/// Nodes without a name and document nodes contribute no segment.
///
/// # Safety
///
/// `node` and every node reachable through `parent` must be valid for reads.
pub(crate) unsafe fn ancestor_path(node: *const XmlNode) -> String {
    let mut segments: Vec<Cow<'_, str>> = Vec::new();
    let mut current = node;

    while !current.is_null() {
        let n = unsafe { &*current };
        let is_document = n.node_type == XML_DOCUMENT_NODE || n.node_type == XML_HTML_DOCUMENT_NODE;
        if !is_document && !n.name.is_null() {
            segments.push(unsafe { lossy(n.name as *const c_char) });
        }
        current = n.parent;
    }

    segments.reverse();
    segments.join("/")
}

/// Read a native string at its exact length.
unsafe fn lossy<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

/// Scoped installation of libxml2's thread-local structured error handler.
///
/// Used where libxml2 has no per-context handler (document parsing, the
/// generic channel of schema compilation). Whatever handler the thread had
/// before is put back when the guard drops, before the borrowed sink can go
/// away.
pub(crate) struct ErrorChannel<'a> {
    previous: (XmlStructuredErrorFunc, *mut c_void),
    _sink: PhantomData<&'a mut ()>,
}

impl<'a> ErrorChannel<'a> {
    /// Route the calling thread's native diagnostics into `sink`.
    pub(crate) fn capture<S: DiagnosticSink>(sink: &'a mut S) -> Self {
        Self::install(
            Some(collect_native_error::<S>),
            sink as *mut S as *mut c_void,
        )
    }

    /// Swallow the calling thread's native diagnostics.
    pub(crate) fn silence() -> Self {
        Self::install(Some(discard_native_error), ptr::null_mut())
    }

    fn install(handler: XmlStructuredErrorFunc, ctx: *mut c_void) -> Self {
        let previous = current_structured_handler();
        unsafe { xmlSetStructuredErrorFunc(ctx, handler) };
        Self {
            previous,
            _sink: PhantomData,
        }
    }
}

impl Drop for ErrorChannel<'_> {
    fn drop(&mut self) {
        let (handler, ctx) = self.previous;
        unsafe { xmlSetStructuredErrorFunc(ctx, handler) };
    }
}

/// The calling thread's structured handler and its context.
pub(crate) fn current_structured_handler() -> (XmlStructuredErrorFunc, *mut c_void) {
    unsafe { (*__xmlStructuredError(), *__xmlStructuredErrorContext()) }
}
