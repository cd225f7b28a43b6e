//! Shared helpers for the integration tests.
//!
//! Tests inside one binary run in parallel against libxml2's process globals,
//! so they share a single engine that is initialized once and never cleaned
//! up. Only `global_engine_test` exercises cleanup, in its own process.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::OnceLock;

use xsd_validate::{Engine, Options, SchemaHandle};

/// Element declared as `xs:string`.
pub const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

/// `root/item/quantity` where quantity is a positive integer.
pub const NESTED_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="item" maxOccurs="unbounded">
                    <xs:complexType>
                        <xs:sequence>
                            <xs:element name="quantity" type="xs:positiveInteger"/>
                        </xs:sequence>
                    </xs:complexType>
                </xs:element>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

pub fn engine() -> &'static Engine {
    static ENGINE: OnceLock<Engine> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let engine = Engine::new();
        engine.init().expect("engine init");
        engine
    })
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).expect("fixture readable")
}

pub fn shiporder_schema() -> SchemaHandle {
    let path = fixture("shiporder.xsd");
    engine()
        .new_schema_from_url(path.to_str().expect("utf-8 fixture path"), Options::default())
        .expect("shiporder schema compiles")
}

pub fn compile(xsd: &str) -> SchemaHandle {
    engine()
        .new_schema_from_buffer(xsd.as_bytes(), Options::default())
        .expect("schema compiles")
}

/// Element name of exactly `len` characters.
pub fn element_name(len: usize) -> String {
    (0..len)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect()
}

/// Schema with one root element `name` of type `xs:int`.
pub fn int_element_schema(name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="{name}" type="xs:int"/>
</xs:schema>"#
    )
}

/// Shiporder document whose only item has the given quantity.
pub fn shiporder_with_quantity(quantity: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<shiporder orderid="889923">
  <orderperson>John Smith</orderperson>
  <shipto>
    <name>Ola Nordmann</name>
    <address>Langgt 23</address>
    <city>4000 Stavanger</city>
    <country>Norway</country>
  </shipto>
  <item>
    <title>Empire Burlesque</title>
    <quantity>{quantity}</quantity>
    <price>10.90</price>
  </item>
</shiporder>"#
    )
}
