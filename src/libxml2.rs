//! LibXML2 FFI Module
//!
//! Direct bindings to the parts of libxml2 this crate coordinates: schema
//! compilation, in-memory document parsing, tree validation, and the process
//! globals (parser init/cleanup). Everything above this module talks in terms
//! of [`crate::SchemaHandle`], [`crate::DocumentHandle`] and [`crate::XsdError`];
//! no raw native codes leave it except as [`crate::Diagnostic::code`].
//!
//! ## Thread Safety Strategy
//!
//! According to the libxml2 documentation (http://xmlsoft.org/threads.html):
//!
//! - Validation is thread-safe for different documents sharing one schema
//! - Document parsing is thread-safe with one parser context per call
//! - Schema structures are thread-safe for reading after parsing
//!
//! **Our Implementation:**
//! - **Schema compilation**: serialized by the engine (see `Engine::compile_lock`)
//! - **Document parsing / validation**: fully parallel, one native context per call
//! - **Error routing**: per-context structured handlers where libxml2 offers
//!   them, otherwise the thread-local structured handler, installed for the call on
//!   the calling thread and restored afterwards

use std::ffi::CString;
use std::ptr::{self, NonNull};

use libc::{c_char, c_int, c_uchar, c_void};
use tracing::{debug, warn};

use crate::collector::{ErrorChannel, StructuredSink, TextSink, collect_native_error};
use crate::error::{DocumentParseKind, Result, ValidationError, XsdError};
use crate::options::Options;

/// `XML_PARSE_NONET`: forbid network access while parsing payloads.
const XML_PARSE_NONET: c_int = 1 << 11;

/// `xmlElementType` values of nodes that never contribute a path segment.
pub(crate) const XML_DOCUMENT_NODE: c_int = 9;
pub(crate) const XML_HTML_DOCUMENT_NODE: c_int = 13;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

/// Leading fields of `xmlNode`, shared with `xmlAttr` and `xmlDoc`.
///
/// Only ever read through pointers handed out by libxml2; the remaining
/// fields of the native struct follow `parent` and are never touched.
#[repr(C)]
pub struct XmlNode {
    pub _private: *mut c_void,
    pub node_type: c_int,
    pub name: *const c_uchar,
    pub children: *mut XmlNode,
    pub last: *mut XmlNode,
    pub parent: *mut XmlNode,
}

#[repr(C)]
pub struct XmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *const XmlError)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlCleanupParser();
    pub fn xmlSchemaInitTypes();
    pub fn xmlSchemaCleanupTypes();
    pub fn xmlLineNumbersDefault(val: c_int) -> c_int;
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);
    // Thread-local slots behind the `xmlStructuredError` and
    // `xmlStructuredErrorContext` macros
    pub fn __xmlStructuredError() -> *mut XmlStructuredErrorFunc;
    pub fn __xmlStructuredErrorContext() -> *mut *mut c_void;

    // Schema compilation
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *mut XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Document parsing
    pub fn xmlNewParserCtxt() -> *mut XmlParserCtxt;
    pub fn xmlFreeParserCtxt(ctxt: *mut XmlParserCtxt);
    pub fn xmlCtxtReadMemory(
        ctxt: *mut XmlParserCtxt,
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    // Schema validation
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
}

/// Process-wide hooks of the native engine.
///
/// The engine's lifecycle state machine and the reclamation ticker only call
/// through this trait, so tests can observe them without resetting libxml2's
/// process globals underneath other tests.
pub trait NativeRuntime: Send + Sync {
    /// Initialize parser globals and builtin schema types.
    fn init(&self);
    /// Release native global caches.
    fn cleanup(&self);
    /// Return freed allocator memory to the operating system.
    fn trim(&self);
}

#[cfg(test)]
mockall::mock! {
    pub NativeRuntime {}

    impl NativeRuntime for NativeRuntime {
        fn init(&self);
        fn cleanup(&self);
        fn trim(&self);
    }
}

/// The production [`NativeRuntime`], backed by libxml2 and the C allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Libxml2Runtime;

impl NativeRuntime for Libxml2Runtime {
    fn init(&self) {
        unsafe {
            xmlInitParser();
            xmlSchemaInitTypes();
            xmlLineNumbersDefault(1);
        }
    }

    fn cleanup(&self) {
        unsafe {
            xmlSchemaCleanupTypes();
            xmlCleanupParser();
        }
    }

    fn trim(&self) {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        unsafe {
            libc::malloc_trim(0);
        }
    }
}

/// Where a schema is compiled from
#[derive(Debug, Clone, Copy)]
pub(crate) enum SchemaSource<'a> {
    /// File path or URL understood by libxml2's I/O layer.
    Url(&'a str),
    Buffer(&'a [u8]),
}

impl SchemaSource<'_> {
    fn describe(&self) -> String {
        match self {
            SchemaSource::Url(url) => (*url).to_string(),
            SchemaSource::Buffer(bytes) => format!("<memory: {} bytes>", bytes.len()),
        }
    }
}

/// Compile a schema, collecting the schema parser's diagnostics on failure.
///
/// Callers must serialize calls to this function.
pub(crate) fn compile_schema(source: SchemaSource<'_>, options: Options) -> Result<NonNull<XmlSchema>> {
    let verbose = options.parse_verbose();

    let parser_ctxt = match source {
        SchemaSource::Url(url) => {
            let c_url = CString::new(url).map_err(|_| XsdError::SchemaCompile {
                message: format!("schema location contains a NUL byte: {:?}", url),
            })?;
            unsafe {
                xmlLineNumbersDefault(1);
                xmlSchemaNewParserCtxt(c_url.as_ptr())
            }
        }
        SchemaSource::Buffer(bytes) => {
            let size = c_int::try_from(bytes.len()).map_err(|_| XsdError::SchemaCompile {
                message: format!("schema of {} bytes exceeds the parser limit", bytes.len()),
            })?;
            unsafe {
                xmlLineNumbersDefault(1);
                xmlSchemaNewMemParserCtxt(bytes.as_ptr() as *const c_char, size)
            }
        }
    };

    if parser_ctxt.is_null() {
        return Err(XsdError::NativeEngine(
            "xsd parser context creation failed".to_string(),
        ));
    }

    let mut sink = TextSink::new();
    let mut generic = TextSink::new();

    let schema_ptr = {
        let _channel = if verbose {
            ErrorChannel::capture(&mut generic)
        } else {
            ErrorChannel::silence()
        };

        unsafe {
            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(collect_native_error::<TextSink>),
                &mut sink as *mut TextSink as *mut c_void,
            );

            let schema_ptr = xmlSchemaParse(parser_ctxt);

            // Always free the parser context
            xmlSchemaFreeParserCtxt(parser_ctxt);
            schema_ptr
        }
    };

    match NonNull::new(schema_ptr) {
        Some(schema) => {
            debug!(source = %source.describe(), "schema compiled");
            Ok(schema)
        }
        None => {
            let mut message = sink.finish();
            let generic = generic.finish();
            if !generic.is_empty() {
                if !message.is_empty() {
                    message.push('\n');
                }
                message.push_str(&generic);
            }
            if message.is_empty() {
                message = "xsd parser internal error".to_string();
            }
            warn!(source = %source.describe(), error = %message, "schema compilation failed");
            Err(XsdError::SchemaCompile { message })
        }
    }
}

/// Parse one XML payload into a native document tree.
pub(crate) fn parse_document(xml: &[u8], options: Options) -> Result<NonNull<XmlDoc>> {
    let verbose = options.parse_verbose();

    // libxml2's own report for this case is far less helpful
    if xml.is_empty() {
        let message = if verbose {
            "parser error : Document is empty"
        } else {
            "document is empty"
        };
        return Err(XsdError::DocumentParse {
            kind: DocumentParseKind::Empty,
            message: message.to_string(),
        });
    }

    let size = c_int::try_from(xml.len()).map_err(|_| XsdError::DocumentParse {
        kind: DocumentParseKind::TooLarge,
        message: format!("document of {} bytes exceeds the parser limit", xml.len()),
    })?;

    let parser_ctxt = unsafe {
        xmlLineNumbersDefault(1);
        xmlNewParserCtxt()
    };
    if parser_ctxt.is_null() {
        return Err(XsdError::NativeEngine(
            "xml parser context creation failed".to_string(),
        ));
    }

    let mut sink = TextSink::new();

    let doc_ptr = {
        let _channel = if verbose {
            ErrorChannel::capture(&mut sink)
        } else {
            ErrorChannel::silence()
        };

        unsafe {
            let doc_ptr = xmlCtxtReadMemory(
                parser_ctxt,
                xml.as_ptr() as *const c_char,
                size,
                ptr::null(),
                ptr::null(),
                XML_PARSE_NONET,
            );
            xmlFreeParserCtxt(parser_ctxt);
            doc_ptr
        }
    };

    NonNull::new(doc_ptr).ok_or_else(|| {
        let text = sink.finish();
        let message = if verbose && !text.is_empty() {
            text
        } else {
            "malformed xml document".to_string()
        };
        XsdError::DocumentParse {
            kind: DocumentParseKind::Malformed,
            message,
        }
    })
}

/// Validate a parsed document against a compiled schema.
///
/// Both pointers must stay alive for the duration of the call; the path walk
/// inside the structured callback reads the document tree.
pub(crate) fn validate_document(
    doc: NonNull<XmlDoc>,
    schema: NonNull<XmlSchema>,
    options: Options,
) -> Result<()> {
    // Each call creates its own validation context; the schema is only read
    let valid_ctxt = unsafe { xmlSchemaNewValidCtxt(schema.as_ptr()) };
    if valid_ctxt.is_null() {
        return Err(XsdError::NativeEngine(
            "xml validation context creation failed".to_string(),
        ));
    }

    let mut sink = StructuredSink::new();
    let mut generic = TextSink::new();

    let code = {
        let _channel = if options.validate_verbose() {
            Some(ErrorChannel::capture(&mut generic))
        } else {
            None
        };

        unsafe {
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(collect_native_error::<StructuredSink>),
                &mut sink as *mut StructuredSink as *mut c_void,
            );

            let code = xmlSchemaValidateDoc(valid_ctxt, doc.as_ptr());

            // Always free the validation context
            xmlSchemaFreeValidCtxt(valid_ctxt);
            code
        }
    };

    let diagnostics = sink.into_diagnostics();
    if !diagnostics.is_empty() {
        return Err(ValidationError::new(diagnostics).into());
    }

    match code {
        0 => Ok(()),
        code => {
            let mut message = if code < 0 {
                "xml validation internal error".to_string()
            } else {
                format!("validation failed with code {} but reported no diagnostics", code)
            };
            let generic = generic.finish();
            if !generic.is_empty() {
                message.push_str(": ");
                message.push_str(&generic);
            }
            warn!(code, error = %message, "native validation failure");
            Err(XsdError::NativeEngine(message))
        }
    }
}
