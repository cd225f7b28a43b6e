//! Typed owners of native schema and document resources.
//!
//! Each handle exclusively owns one libxml2 allocation and releases it on
//! [`Drop`], so scoped use needs no manual cleanup. [`SchemaHandle::free`] and
//! [`DocumentHandle::free`] release early and null the pointer; a freed (or
//! default-constructed) handle is rejected by validation with a
//! [`crate::LifecycleError`] instead of reaching native code. So is a handle
//! that outlived the engine generation it was created in.

use std::ptr::NonNull;

use crate::error::Result;
use crate::libxml2::{self, SchemaSource, XmlDoc, XmlSchema, xmlFreeDoc, xmlSchemaFree};
use crate::options::Options;

/// A compiled XML Schema.
///
/// Read-only once built and safe to share across threads, e.g. behind an
/// `Arc` or a `&'static`, for any number of concurrent validations.
#[derive(Debug, Default)]
pub struct SchemaHandle {
    ptr: Option<NonNull<XmlSchema>>,
    generation: u64,
}

// Safety: libxml2 documentation states that xmlSchema structures are thread-safe for reading
// See: http://xmlsoft.org/threads.html
// Nothing mutates the schema after compilation and `free` requires `&mut self`.
unsafe impl Send for SchemaHandle {}
unsafe impl Sync for SchemaHandle {}

impl SchemaHandle {
    pub(crate) fn compile(
        source: SchemaSource<'_>,
        options: Options,
        generation: u64,
    ) -> Result<Self> {
        let ptr = libxml2::compile_schema(source, options)?;
        Ok(Self {
            ptr: Some(ptr),
            generation,
        })
    }

    /// True for a default-constructed or freed handle.
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Release the compiled schema. A no-op on a null handle.
    pub fn free(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { xmlSchemaFree(ptr.as_ptr()) };
        }
    }

    /// The native pointer, if the handle is live in `generation`.
    pub(crate) fn live_ptr(&self, generation: u64) -> Option<NonNull<XmlSchema>> {
        self.ptr.filter(|_| self.generation == generation)
    }
}

impl Drop for SchemaHandle {
    fn drop(&mut self) {
        self.free();
    }
}

/// A parsed XML document, owned by the single validation that uses it.
///
/// `Send` so it can be handed to a worker thread, but not `Sync`: it is never
/// shared between concurrent validations.
#[derive(Debug, Default)]
pub struct DocumentHandle {
    ptr: Option<NonNull<XmlDoc>>,
    generation: u64,
}

// Safety: a parsed document has no thread affinity; exclusive ownership moves with the handle.
unsafe impl Send for DocumentHandle {}

impl DocumentHandle {
    pub(crate) fn parse(xml: &[u8], options: Options, generation: u64) -> Result<Self> {
        let ptr = libxml2::parse_document(xml, options)?;
        Ok(Self {
            ptr: Some(ptr),
            generation,
        })
    }

    /// True for a default-constructed or freed handle.
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Release the document tree. A no-op on a null handle.
    pub fn free(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { xmlFreeDoc(ptr.as_ptr()) };
        }
    }

    /// The native pointer, if the handle is live in `generation`.
    pub(crate) fn live_ptr(&self, generation: u64) -> Option<NonNull<XmlDoc>> {
        self.ptr.filter(|_| self.generation == generation)
    }
}

impl Drop for DocumentHandle {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libxml2::{Libxml2Runtime, NativeRuntime};

    const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

    const GENERATION: u64 = 7;

    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_send<T: Send>() {}

    #[test]
    fn test_thread_markers() {
        assert_send_sync::<SchemaHandle>();
        assert_send::<DocumentHandle>();
    }

    #[test]
    fn test_null_handles_free_is_noop() {
        let mut schema = SchemaHandle::default();
        assert!(schema.is_null());
        schema.free();
        schema.free();
        assert!(schema.is_null());

        let mut document = DocumentHandle::default();
        assert!(document.is_null());
        document.free();
        assert!(document.is_null());
    }

    #[test]
    fn test_free_nulls_the_pointer() {
        Libxml2Runtime.init();

        let mut schema =
            SchemaHandle::compile(
                SchemaSource::Buffer(SIMPLE_XSD.as_bytes()),
                Options::default(),
                GENERATION,
            )
            .unwrap();
        assert!(!schema.is_null());
        schema.free();
        assert!(schema.is_null());
        assert!(schema.live_ptr(GENERATION).is_none());
        // Second free must not reach xmlSchemaFree
        schema.free();

        let mut document =
            DocumentHandle::parse(b"<root>x</root>", Options::default(), GENERATION).unwrap();
        assert!(!document.is_null());
        document.free();
        assert!(document.is_null());
    }

    #[test]
    fn test_memory_safety() {
        // Test that dropping handles doesn't cause issues
        Libxml2Runtime.init();

        {
            let schema = SchemaHandle::compile(
                SchemaSource::Buffer(SIMPLE_XSD.as_bytes()),
                Options::default(),
                GENERATION,
            )
            .unwrap();
            assert!(!schema.is_null());
            // Schema should be dropped here
        }

        // Should still be able to create new schemas
        let schema2 =
            SchemaHandle::compile(
                SchemaSource::Buffer(SIMPLE_XSD.as_bytes()),
                Options::default(),
                GENERATION,
            )
            .unwrap();
        assert!(!schema2.is_null());
    }

    #[test]
    fn test_handles_are_live_only_in_their_generation() {
        Libxml2Runtime.init();

        let schema = SchemaHandle::compile(
            SchemaSource::Buffer(SIMPLE_XSD.as_bytes()),
            Options::default(),
            GENERATION,
        )
        .unwrap();
        assert!(schema.live_ptr(GENERATION).is_some());
        assert!(schema.live_ptr(GENERATION + 1).is_none());
        assert!(!schema.is_null());

        let document =
            DocumentHandle::parse(b"<root>x</root>", Options::default(), GENERATION).unwrap();
        assert!(document.live_ptr(GENERATION).is_some());
        assert!(document.live_ptr(GENERATION + 1).is_none());

        assert!(SchemaHandle::default().live_ptr(0).is_none());
        assert!(DocumentHandle::default().live_ptr(0).is_none());
    }
}
