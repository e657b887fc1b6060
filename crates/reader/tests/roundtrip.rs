//! Parse → mutate → serialize through the public API

use microdom::{
    EventRegistry, EventType, NamespaceContext, OutputEncoding, WriterSettings, XmlSerializer,
};
use microdom_reader::{DomReader, EngineConfig, InputSource, ReadError, ReaderSettings};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn compact() -> XmlSerializer {
    XmlSerializer::with_settings(WriterSettings::compact())
}

#[test]
fn namespace_declarations_survive_roundtrip() {
    init_logging();
    let source = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="urn:media"><entry><title>One</title><media:thumbnail url="a.png"/></entry></feed>"#;

    let arena = DomReader::new()
        .read_source(InputSource::text(source))
        .unwrap();
    assert_eq!(compact().serialize_document(&arena).unwrap(), source);
}

#[test]
fn edited_tree_gets_synthesized_prefixes() {
    init_logging();
    let mut arena = DomReader::new()
        .read_source(InputSource::text("<inventory><item>bolt</item></inventory>"))
        .unwrap();
    let inventory = arena
        .first_child_element(arena.root_id().unwrap())
        .unwrap()
        .unwrap();

    let price = arena.create_element_ns("urn:price", "price");
    arena.append_text(price, "0.10").unwrap();
    let item = arena.first_child_element(inventory).unwrap().unwrap();
    arena.append_child(item, price).unwrap();

    let stock = arena.create_element_ns("urn:stock", "stock");
    arena.append_child(inventory, stock).unwrap();

    assert_eq!(
        compact().serialize_document(&arena).unwrap(),
        r#"<inventory><item>bolt<ns0:price xmlns:ns0="urn:price">0.10</ns0:price></item><ns1:stock xmlns:ns1="urn:stock"/></inventory>"#
    );

    let settings = WriterSettings::compact()
        .with_namespace_context(NamespaceContext::new().with_mapping("p", "urn:price"));
    let xml = XmlSerializer::with_settings(settings)
        .serialize_document(&arena)
        .unwrap();
    assert!(xml.contains(r#"<p:price xmlns:p="urn:price">"#));
    assert!(xml.contains(r#"<ns0:stock xmlns:ns0="urn:stock"/>"#));
}

#[test]
fn events_bubble_through_parsed_tree() {
    init_logging();
    let mut arena = DomReader::new()
        .read_source(InputSource::text("<a><b><c/></b></a>"))
        .unwrap();
    let a = arena.first_child_element(arena.root_id().unwrap()).unwrap().unwrap();
    let c = arena.descendant_elements_named(a, "c").unwrap()[0];

    let mut registry = EventRegistry::new();
    let _ = registry.register_event_target(
        a,
        EventType::AttributeChanged,
        Rc::new(|event: &microdom::DomEvent, arena: &mut microdom::DomArena| {
            let _ = arena.set_attribute(event.current, "touched", "true");
        }),
    );

    let invoked = registry
        .dispatch(&mut arena, EventType::AttributeChanged, c, c)
        .unwrap();
    assert_eq!(invoked, 1);
    assert_eq!(
        compact().serialize_document(&arena).unwrap(),
        r#"<a touched="true"><b><c/></b></a>"#
    );
}

#[test]
fn concurrent_reads_share_bounded_pool() {
    init_logging();
    let reader = DomReader::with_pool(3, EngineConfig::default());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let reader = reader.clone();
            thread::spawn(move || {
                let text = format!("<doc n=\"{}\"><v>{}</v></doc>", i, i * 2);
                let arena = reader.read_source(InputSource::text(text.clone())).unwrap();
                assert_eq!(compact().serialize_document(&arena).unwrap(), text);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = reader.pool().stats();
    assert!(stats.live <= 3);
    assert_eq!(stats.active, 0);
}

#[test]
fn file_roundtrip_with_encoding() {
    init_logging();
    let path = std::env::temp_dir().join(format!("microdom-roundtrip-{}.xml", std::process::id()));
    std::fs::write(&path, "<?xml version=\"1.0\"?>\n<menu><dish>crème brûlée</dish></menu>").unwrap();

    let arena = DomReader::new()
        .read(InputSource::file(&path), &ReaderSettings::new())
        .unwrap();
    std::fs::remove_file(&path).unwrap();

    let settings = WriterSettings::default().with_encoding(OutputEncoding::Ascii);
    let mut out = Vec::new();
    XmlSerializer::with_settings(settings)
        .write_to(&arena, arena.root_id().unwrap(), &mut out)
        .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "<?xml version=\"1.0\" encoding=\"US-ASCII\"?>\n\
         <menu>\n  <dish>cr&#xE8;me br&#xFB;l&#xE9;e</dish>\n</menu>\n"
    );
}

#[test]
fn malformed_document_reports_position() {
    init_logging();
    let err = DomReader::new()
        .read(
            InputSource::text("<root>\n  <open>\n</root>"),
            &ReaderSettings::new().with_error_handler(Arc::new(|_: &microdom_reader::ParseMessage| {})),
        )
        .unwrap_err();
    let ReadError::Fatal { messages } = err else {
        panic!("expected a fatal parse error");
    };
    assert_eq!(messages.len(), 1);
    assert!(messages[0].line.unwrap() >= 2);
}

#[test]
fn undeclared_default_namespace_roundtrip() {
    init_logging();
    let source = r#"<feed xmlns="urn:feed"><meta xmlns=""><tag/></meta><entry/></feed>"#;
    let mut arena = DomReader::new()
        .read_source(InputSource::text(source))
        .unwrap();
    assert_eq!(compact().serialize_document(&arena).unwrap(), source);

    let feed = arena.first_child_element(arena.root_id().unwrap()).unwrap().unwrap();
    let plain = arena.create_element("plain");
    arena.append_child(feed, plain).unwrap();
    assert_eq!(
        compact().serialize_document(&arena).unwrap(),
        r#"<feed xmlns="urn:feed"><meta xmlns=""><tag/></meta><entry/><plain xmlns=""/></feed>"#
    );
}
