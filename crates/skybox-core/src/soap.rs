//! Minimal SOAP 1.1 client for UPnP control actions.
//!
//! Response fields are handed back *still escaped* — embedded payloads like
//! DIDL-Lite fragments are double-encoded on the wire, and decoding them is
//! the caller's job (see [`crate::xmltext`]).

use crate::xmltext;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SoapError {
    #[error("SOAP transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("device answered {action} with HTTP {status}")]
    Fault { action: String, status: u16 },
    #[error("parsing SOAP response: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("SOAP response has no {0} field")]
    MissingField(String),
    #[error("SOAP response field {field}: {message}")]
    BadField { field: String, message: String },
}

/// One UPnP control endpoint speaker.
#[derive(Clone)]
pub struct SoapClient {
    http: reqwest::Client,
    user_agent: String,
}

impl SoapClient {
    pub fn new(http: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            http,
            user_agent: user_agent.into(),
        }
    }

    /// Invoke `action` on `service_type` at `control_url`.
    pub async fn call(
        &self,
        control_url: &Url,
        service_type: &str,
        action: &str,
        args: &[(&str, String)],
    ) -> Result<SoapResponse, SoapError> {
        let envelope = build_envelope(service_type, action, args);
        tracing::trace!("SOAP {} -> {}", action, control_url);

        let response = self
            .http
            .post(control_url.clone())
            .header("SOAPACTION", format!("\"{}#{}\"", service_type, action))
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
            .header(reqwest::header::USER_AGENT, self.user_agent.clone())
            .body(envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SoapError::Fault {
                action: action.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(SoapResponse { body })
    }
}

/// Raw SOAP response body with per-field access.
#[derive(Debug)]
pub struct SoapResponse {
    body: String,
}

impl SoapResponse {
    #[cfg(test)]
    pub fn from_body(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Text content of the response element `name`, exactly as it appears
    /// on the wire — no entity expansion.
    pub fn field(&self, name: &str) -> Result<String, SoapError> {
        let mut reader = Reader::from_str(&self.body);
        reader.trim_text(false);

        let mut inside = false;
        let mut value = String::new();
        loop {
            match reader.read_event()? {
                Event::Start(e) if e.local_name().as_ref() == name.as_bytes() => {
                    inside = true;
                }
                Event::Text(e) if inside => {
                    value.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
                Event::CData(e) if inside => {
                    value.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
                Event::End(e) if e.local_name().as_ref() == name.as_bytes() => {
                    return Ok(value);
                }
                Event::Eof => return Err(SoapError::MissingField(name.to_string())),
                _ => {}
            }
        }
    }

    /// `field(name)` parsed as an integer.
    pub fn uint_field(&self, name: &str) -> Result<u32, SoapError> {
        let raw = self.field(name)?;
        raw.trim()
            .parse()
            .map_err(|_| SoapError::BadField {
                field: name.to_string(),
                message: format!("not an unsigned integer: {:?}", raw),
            })
    }
}

fn build_envelope(service_type: &str, action: &str, args: &[(&str, String)]) -> String {
    let mut body = String::new();
    for (name, value) in args {
        body.push_str(&format!(
            "<{name}>{}</{name}>",
            xmltext::encode(value),
            name = name
        ));
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
            r#"<s:Body><u:{action} xmlns:u="{service}">{body}</u:{action}></s:Body>"#,
            r#"</s:Envelope>"#
        ),
        action = action,
        service = service_type,
        body = body,
    )
}
