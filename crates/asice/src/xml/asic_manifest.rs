//! `ASiCManifest` document of the detached dialect.

use super::{normalize_namespaces, structure, Element, Writer, XmlError, NS_ASIC, NS_DSIG};

/// Signature reference used when a manifest omits `SigReference`.
pub const DEFAULT_SIG_REFERENCE: &str = "META-INF/signature.p7s";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigReference {
    pub uri: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObjectReference {
    pub uri: String,
    pub mime_type: Option<String>,
    pub rootfile: bool,
    pub digest_method: String,
    pub digest_value: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsicManifest {
    pub sig_reference: Option<SigReference>,
    pub data_objects: Vec<DataObjectReference>,
}

impl AsicManifest {
    /// The reference that pairs this manifest with its signature entry.
    pub fn sig_reference_uri(&self) -> &str {
        self.sig_reference
            .as_ref()
            .map(|r| r.uri.as_str())
            .unwrap_or(DEFAULT_SIG_REFERENCE)
    }

    pub fn root_files(&self) -> impl Iterator<Item = &str> {
        self.data_objects
            .iter()
            .filter(|o| o.rootfile)
            .map(|o| o.uri.as_str())
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, XmlError> {
        let mut w = Writer::new();
        w.declaration()?;
        w.start(
            "asic:ASiCManifest",
            &[("xmlns:asic", NS_ASIC), ("xmlns:ds", NS_DSIG)],
        )?;

        if let Some(sig) = &self.sig_reference {
            let mut attrs = vec![("URI", sig.uri.as_str())];
            if let Some(mime) = &sig.mime_type {
                attrs.push(("MimeType", mime.as_str()));
            }
            w.empty("asic:SigReference", &attrs)?;
        }

        for object in &self.data_objects {
            let mut attrs = vec![("URI", object.uri.as_str())];
            if let Some(mime) = &object.mime_type {
                attrs.push(("MimeType", mime.as_str()));
            }
            if object.rootfile {
                attrs.push(("Rootfile", "true"));
            }
            w.start("asic:DataObjectReference", &attrs)?;
            w.empty(
                "ds:DigestMethod",
                &[("Algorithm", object.digest_method.as_str())],
            )?;
            w.base64_element("ds:DigestValue", &object.digest_value)?;
            w.end("asic:DataObjectReference")?;
        }

        w.end("asic:ASiCManifest")?;
        Ok(w.into_bytes())
    }

    pub fn from_xml(payload: &[u8]) -> Result<Self, XmlError> {
        let payload = normalize_namespaces(payload);
        let root = Element::parse(&payload)?;
        root.expect_root("ASiCManifest", NS_ASIC)?;

        let sig_reference = root
            .child("SigReference")
            .map(|sig| -> Result<SigReference, XmlError> {
                Ok(SigReference {
                    uri: sig.required_attr("URI")?.to_string(),
                    mime_type: sig.attr("MimeType").map(str::to_string),
                })
            })
            .transpose()?;

        let mut data_objects = Vec::new();
        for object in root.children_named("DataObjectReference") {
            let rootfile = match object.attr("Rootfile") {
                None | Some("false") | Some("0") => false,
                Some("true") | Some("1") => true,
                Some(other) => {
                    return Err(structure(format!("invalid Rootfile value '{other}'")));
                }
            };
            data_objects.push(DataObjectReference {
                uri: object.required_attr("URI")?.to_string(),
                mime_type: object.attr("MimeType").map(str::to_string),
                rootfile,
                digest_method: object
                    .required_child("DigestMethod")?
                    .required_attr("Algorithm")?
                    .to_string(),
                digest_value: object.required_child("DigestValue")?.base64_text()?,
            });
        }

        Ok(Self {
            sig_reference,
            data_objects,
        })
    }
}
