//! Typed XML documents carried in `META-INF/`.
//!
//! Parsing goes through a small owned element tree built from `quick-xml`
//! events; element and attribute lookups use local names so documents are
//! accepted regardless of the prefixes their producer picked. Serialization
//! writes a fixed prefix layout, which makes the output byte-stable: signed
//! fragments are signed exactly as [`Writer`] emits them.

pub mod asic_manifest;
pub mod oasis;
pub mod xades;

pub use asic_manifest::{AsicManifest, DataObjectReference, SigReference};
pub use oasis::{FileEntry, OasisManifest};
pub use xades::{
    DataObjectFormat, Reference, SignedInfo, SignedProperties, XadesSignature, XadesSignatures,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::borrow::Cow;

pub const NS_ASIC: &str = "http://uri.etsi.org/02918/v1.2.1#";
pub const NS_DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const NS_XADES: &str = "http://uri.etsi.org/01903/v1.3.2#";
pub const NS_OASIS_MANIFEST: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";

/// Namespace URIs written by older producers for the ASiC schema.
const LEGACY_ASIC_NAMESPACES: &[&str] = &[
    "http://uri.etsi.org/02918/v1.1.1#",
    "http://uri.etsi.org/2918/v1.2.1#",
];

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error(transparent)]
    Parse(#[from] quick_xml::Error),

    #[error(transparent)]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error(transparent)]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("payload is not UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("invalid base64 in <{element}>")]
    Base64 {
        element: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("{0}")]
    Structure(String),
}

fn structure(message: impl Into<String>) -> XmlError {
    XmlError::Structure(message.into())
}

/// Rewrite known legacy namespace URIs to their current form.
pub fn normalize_namespaces(payload: &[u8]) -> Cow<'_, [u8]> {
    let text = String::from_utf8_lossy(payload);
    if !LEGACY_ASIC_NAMESPACES.iter().any(|ns| text.contains(ns)) {
        return Cow::Borrowed(payload);
    }
    let mut normalized = text.into_owned();
    for legacy in LEGACY_ASIC_NAMESPACES {
        normalized = normalized.replace(legacy, NS_ASIC);
    }
    Cow::Owned(normalized.into_bytes())
}

/// Owned element node.
#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub(crate) prefix: Option<String>,
    pub(crate) name: String,
    attributes: Vec<(String, String)>,
    pub(crate) children: Vec<Element>,
    pub(crate) text: String,
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let qname = std::str::from_utf8(start.name().as_ref())?.to_string();
        let (prefix, name) = split_qname(&qname);
        let mut element = Element {
            prefix: prefix.map(str::to_string),
            name: name.to_string(),
            ..Default::default()
        };
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    /// Parse a whole document and return its root element.
    pub(crate) fn parse(payload: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(payload);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(start) => stack.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| structure("unbalanced closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(std::str::from_utf8(&data)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(structure("document ended inside an element"));
        }
        root.ok_or_else(|| structure("document has no root element"))
    }

    /// Namespace URI bound to this element's prefix (declared on this element).
    pub(crate) fn namespace(&self) -> Option<&str> {
        let wanted = match &self.prefix {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        self.attributes
            .iter()
            .find(|(key, _)| *key == wanted)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute by local name; namespace declarations are never returned.
    pub(crate) fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .filter(|(key, _)| key != "xmlns" && !key.starts_with("xmlns:"))
            .find(|(key, _)| split_qname(key).1 == local)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn required_attr(&self, local: &str) -> Result<&str, XmlError> {
        self.attr(local)
            .ok_or_else(|| structure(format!("<{}> is missing attribute {local}", self.name)))
    }

    pub(crate) fn child(&self, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == local)
    }

    pub(crate) fn required_child(&self, local: &str) -> Result<&Element, XmlError> {
        self.child(local)
            .ok_or_else(|| structure(format!("<{}> is missing <{local}>", self.name)))
    }

    pub(crate) fn children_named<'a>(
        &'a self,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == local)
    }

    pub(crate) fn base64_text(&self) -> Result<Vec<u8>, XmlError> {
        let compact: String = self.text.split_whitespace().collect();
        BASE64.decode(compact).map_err(|source| XmlError::Base64 {
            element: self.name.clone(),
            source,
        })
    }

    pub(crate) fn expect_root(&self, local: &str, namespace: &str) -> Result<(), XmlError> {
        if self.name != local {
            return Err(structure(format!(
                "expected root <{local}>, found <{}>",
                self.name
            )));
        }
        match self.namespace() {
            Some(ns) if ns == namespace => Ok(()),
            Some(ns) => Err(structure(format!(
                "<{local}> has unexpected namespace {ns}"
            ))),
            None => Err(structure(format!("<{local}> has no namespace declaration"))),
        }
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(structure("multiple root elements")),
    }
    Ok(())
}

/// Event writer with the handful of shapes the documents need.
pub(crate) struct Writer {
    inner: quick_xml::Writer<Vec<u8>>,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self {
            inner: quick_xml::Writer::new(Vec::new()),
        }
    }

    pub(crate) fn declaration(&mut self) -> Result<(), XmlError> {
        self.inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        Ok(())
    }

    pub(crate) fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), XmlError> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.inner.write_event(Event::Start(start))?;
        Ok(())
    }

    pub(crate) fn end(&mut self, name: &str) -> Result<(), XmlError> {
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), XmlError> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.inner.write_event(Event::Empty(start))?;
        Ok(())
    }

    pub(crate) fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<(), XmlError> {
        self.start(name, attrs)?;
        self.inner.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    pub(crate) fn base64_element(&mut self, name: &str, bytes: &[u8]) -> Result<(), XmlError> {
        self.text_element(name, &[], &BASE64.encode(bytes))
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}
