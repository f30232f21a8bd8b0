//! `XAdESSignatures` document of the inline dialect.
//!
//! `SignedInfo` and `SignedProperties` can be written stand-alone (with their
//! namespace declarations) by `canonical_bytes`; those are the exact bytes that
//! get signed and digested. The reader re-derives them from the parsed
//! structure to check the signature.

use super::{structure, Element, Writer, XmlError, NS_ASIC, NS_DSIG, NS_XADES};

pub const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";
pub const C14N11: &str = "http://www.w3.org/2006/12/xml-c14n11";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: Option<String>,
    pub uri: String,
    pub reference_type: Option<String>,
    pub digest_method: String,
    pub digest_value: Vec<u8>,
}

impl Reference {
    /// Same-document references (`#...`) point inside the signature itself.
    pub fn is_internal(&self) -> bool {
        self.uri.starts_with('#')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInfo {
    pub canonicalization_method: String,
    pub signature_method: String,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObjectFormat {
    pub object_reference: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedProperties {
    pub id: String,
    pub signing_time: String,
    pub cert_digest_method: String,
    pub cert_digest: Vec<u8>,
    pub issuer_name: String,
    pub serial_number: String,
    pub data_object_formats: Vec<DataObjectFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XadesSignature {
    pub id: Option<String>,
    pub signed_info: SignedInfo,
    pub signature_value: Vec<u8>,
    pub certificate: Option<Vec<u8>>,
    pub signed_properties: Option<SignedProperties>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XadesSignatures {
    pub signatures: Vec<XadesSignature>,
}

impl SignedInfo {
    fn write(&self, w: &mut Writer, standalone: bool) -> Result<(), XmlError> {
        let ns: &[(&str, &str)] = if standalone {
            &[("xmlns:ds", NS_DSIG)]
        } else {
            &[]
        };
        w.start("ds:SignedInfo", ns)?;
        w.empty(
            "ds:CanonicalizationMethod",
            &[("Algorithm", self.canonicalization_method.as_str())],
        )?;
        w.empty(
            "ds:SignatureMethod",
            &[("Algorithm", self.signature_method.as_str())],
        )?;
        for reference in &self.references {
            let mut attrs = Vec::new();
            if let Some(id) = &reference.id {
                attrs.push(("Id", id.as_str()));
            }
            if let Some(t) = &reference.reference_type {
                attrs.push(("Type", t.as_str()));
            }
            attrs.push(("URI", reference.uri.as_str()));
            w.start("ds:Reference", &attrs)?;
            w.empty(
                "ds:DigestMethod",
                &[("Algorithm", reference.digest_method.as_str())],
            )?;
            w.base64_element("ds:DigestValue", &reference.digest_value)?;
            w.end("ds:Reference")?;
        }
        w.end("ds:SignedInfo")
    }

    /// Bytes covered by the signature value.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut w = Writer::new();
        self.write(&mut w, true)?;
        Ok(w.into_bytes())
    }

    fn parse(element: &Element) -> Result<Self, XmlError> {
        let references = element
            .children_named("Reference")
            .map(|r| -> Result<Reference, XmlError> {
                Ok(Reference {
                    id: r.attr("Id").map(str::to_string),
                    uri: r.required_attr("URI")?.to_string(),
                    reference_type: r.attr("Type").map(str::to_string),
                    digest_method: r
                        .required_child("DigestMethod")?
                        .required_attr("Algorithm")?
                        .to_string(),
                    digest_value: r.required_child("DigestValue")?.base64_text()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            canonicalization_method: element
                .required_child("CanonicalizationMethod")?
                .required_attr("Algorithm")?
                .to_string(),
            signature_method: element
                .required_child("SignatureMethod")?
                .required_attr("Algorithm")?
                .to_string(),
            references,
        })
    }
}

impl SignedProperties {
    fn write(&self, w: &mut Writer, standalone: bool) -> Result<(), XmlError> {
        let mut attrs = Vec::new();
        if standalone {
            attrs.push(("xmlns:xades", NS_XADES));
            attrs.push(("xmlns:ds", NS_DSIG));
        }
        attrs.push(("Id", self.id.as_str()));
        w.start("xades:SignedProperties", &attrs)?;

        w.start("xades:SignedSignatureProperties", &[])?;
        w.text_element("xades:SigningTime", &[], &self.signing_time)?;
        w.start("xades:SigningCertificate", &[])?;
        w.start("xades:Cert", &[])?;
        w.start("xades:CertDigest", &[])?;
        w.empty(
            "ds:DigestMethod",
            &[("Algorithm", self.cert_digest_method.as_str())],
        )?;
        w.base64_element("ds:DigestValue", &self.cert_digest)?;
        w.end("xades:CertDigest")?;
        w.start("xades:IssuerSerial", &[])?;
        w.text_element("ds:X509IssuerName", &[], &self.issuer_name)?;
        w.text_element("ds:X509SerialNumber", &[], &self.serial_number)?;
        w.end("xades:IssuerSerial")?;
        w.end("xades:Cert")?;
        w.end("xades:SigningCertificate")?;
        w.end("xades:SignedSignatureProperties")?;

        w.start("xades:SignedDataObjectProperties", &[])?;
        for format in &self.data_object_formats {
            w.start(
                "xades:DataObjectFormat",
                &[("ObjectReference", format.object_reference.as_str())],
            )?;
            w.text_element("xades:MimeType", &[], &format.mime_type)?;
            w.end("xades:DataObjectFormat")?;
        }
        w.end("xades:SignedDataObjectProperties")?;

        w.end("xades:SignedProperties")
    }

    /// Bytes covered by the `SignedProperties` reference digest.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut w = Writer::new();
        self.write(&mut w, true)?;
        Ok(w.into_bytes())
    }

    fn parse(element: &Element) -> Result<Self, XmlError> {
        let signature_props = element.required_child("SignedSignatureProperties")?;
        let cert = signature_props
            .required_child("SigningCertificate")?
            .required_child("Cert")?;
        let cert_digest = cert.required_child("CertDigest")?;
        let issuer_serial = cert.required_child("IssuerSerial")?;

        let data_object_formats = match element.child("SignedDataObjectProperties") {
            Some(props) => props
                .children_named("DataObjectFormat")
                .map(|f| -> Result<DataObjectFormat, XmlError> {
                    Ok(DataObjectFormat {
                        object_reference: f.required_attr("ObjectReference")?.to_string(),
                        mime_type: f.required_child("MimeType")?.text.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            id: element.required_attr("Id")?.to_string(),
            signing_time: signature_props.required_child("SigningTime")?.text.clone(),
            cert_digest_method: cert_digest
                .required_child("DigestMethod")?
                .required_attr("Algorithm")?
                .to_string(),
            cert_digest: cert_digest.required_child("DigestValue")?.base64_text()?,
            issuer_name: issuer_serial.required_child("X509IssuerName")?.text.clone(),
            serial_number: issuer_serial
                .required_child("X509SerialNumber")?
                .text
                .clone(),
            data_object_formats,
        })
    }
}

impl XadesSignature {
    fn parse(element: &Element) -> Result<Self, XmlError> {
        let certificate = element
            .child("KeyInfo")
            .and_then(|k| k.child("X509Data"))
            .and_then(|d| d.child("X509Certificate"))
            .map(Element::base64_text)
            .transpose()?;

        let signed_properties = element
            .children_named("Object")
            .filter_map(|o| o.child("QualifyingProperties"))
            .find_map(|q| q.child("SignedProperties"))
            .map(SignedProperties::parse)
            .transpose()?;

        Ok(Self {
            id: element.attr("Id").map(str::to_string),
            signed_info: SignedInfo::parse(element.required_child("SignedInfo")?)?,
            signature_value: element.required_child("SignatureValue")?.base64_text()?,
            certificate,
            signed_properties,
        })
    }

    /// The `SignedProperties` reference and its target, when both are present.
    pub fn signed_properties_reference(&self) -> Option<(&Reference, &SignedProperties)> {
        let props = self.signed_properties.as_ref()?;
        let target = format!("#{}", props.id);
        self.signed_info
            .references
            .iter()
            .find(|r| r.uri == target)
            .map(|r| (r, props))
    }
}

impl XadesSignatures {
    pub fn to_xml(&self) -> Result<Vec<u8>, XmlError> {
        let mut w = Writer::new();
        w.declaration()?;
        w.start(
            "asic:XAdESSignatures",
            &[
                ("xmlns:asic", NS_ASIC),
                ("xmlns:ds", NS_DSIG),
                ("xmlns:xades", NS_XADES),
            ],
        )?;

        for signature in &self.signatures {
            let mut attrs = Vec::new();
            if let Some(id) = &signature.id {
                attrs.push(("Id", id.as_str()));
            }
            w.start("ds:Signature", &attrs)?;
            signature.signed_info.write(&mut w, false)?;
            w.base64_element("ds:SignatureValue", &signature.signature_value)?;
            if let Some(cert) = &signature.certificate {
                w.start("ds:KeyInfo", &[])?;
                w.start("ds:X509Data", &[])?;
                w.base64_element("ds:X509Certificate", cert)?;
                w.end("ds:X509Data")?;
                w.end("ds:KeyInfo")?;
            }
            if let Some(props) = &signature.signed_properties {
                let target = signature.id.as_ref().map(|id| format!("#{id}"));
                let qp_attrs: Vec<(&str, &str)> = target
                    .as_deref()
                    .map(|t| vec![("Target", t)])
                    .unwrap_or_default();
                w.start("ds:Object", &[])?;
                w.start("xades:QualifyingProperties", &qp_attrs)?;
                props.write(&mut w, false)?;
                w.end("xades:QualifyingProperties")?;
                w.end("ds:Object")?;
            }
            w.end("ds:Signature")?;
        }

        w.end("asic:XAdESSignatures")?;
        Ok(w.into_bytes())
    }

    pub fn from_xml(payload: &[u8]) -> Result<Self, XmlError> {
        let payload = super::normalize_namespaces(payload);
        let root = Element::parse(&payload)?;
        root.expect_root("XAdESSignatures", NS_ASIC)?;

        let signatures = root
            .children_named("Signature")
            .map(XadesSignature::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if signatures.is_empty() {
            return Err(structure("XAdESSignatures contains no signature"));
        }
        Ok(Self { signatures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::SHA256_URI;

    fn sample_signature() -> XadesSignature {
        XadesSignature {
            id: Some("Signature-1".into()),
            signed_info: SignedInfo {
                canonicalization_method: C14N11.into(),
                signature_method: "urn:test:method".into(),
                references: vec![
                    Reference {
                        id: Some("ID_0".into()),
                        uri: "a.txt".into(),
                        reference_type: None,
                        digest_method: SHA256_URI.into(),
                        digest_value: vec![9; 32],
                    },
                    Reference {
                        id: None,
                        uri: "#SignedProperties-1".into(),
                        reference_type: Some(SIGNED_PROPERTIES_TYPE.into()),
                        digest_method: SHA256_URI.into(),
                        digest_value: vec![8; 32],
                    },
                ],
            },
            signature_value: b"sig".to_vec(),
            certificate: Some(b"cert".to_vec()),
            signed_properties: Some(SignedProperties {
                id: "SignedProperties-1".into(),
                signing_time: "2026-01-28T10:00:00Z".into(),
                cert_digest_method: SHA256_URI.into(),
                cert_digest: vec![7; 32],
                issuer_name: "CN=Test Signer".into(),
                serial_number: "0123456789abcdef".into(),
                data_object_formats: vec![DataObjectFormat {
                    object_reference: "#ID_0".into(),
                    mime_type: "text/plain".into(),
                }],
            }),
        }
    }

    #[test]
    fn test_document_roundtrip() {
        let doc = XadesSignatures {
            signatures: vec![sample_signature()],
        };
        let parsed = XadesSignatures::from_xml(&doc.to_xml().unwrap()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_canonical_bytes_survive_reparse() {
        let original = sample_signature();
        let doc = XadesSignatures {
            signatures: vec![original.clone()],
        };
        let parsed = XadesSignatures::from_xml(&doc.to_xml().unwrap()).unwrap();
        let reparsed = &parsed.signatures[0];

        assert_eq!(
            reparsed.signed_info.canonical_bytes().unwrap(),
            original.signed_info.canonical_bytes().unwrap()
        );
        assert_eq!(
            reparsed.signed_properties.as_ref().unwrap().canonical_bytes().unwrap(),
            original.signed_properties.as_ref().unwrap().canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_internal_references() {
        let sig = sample_signature();
        let internal: Vec<_> = sig
            .signed_info
            .references
            .iter()
            .map(Reference::is_internal)
            .collect();
        assert_eq!(internal, vec![false, true]);

        let (reference, props) = sig.signed_properties_reference().unwrap();
        assert_eq!(reference.uri, format!("#{}", props.id));
    }

    #[test]
    fn test_empty_document_rejected() {
        let doc = br#"<XAdESSignatures xmlns="http://uri.etsi.org/02918/v1.2.1#"/>"#;
        assert!(XadesSignatures::from_xml(doc).is_err());
    }
}
