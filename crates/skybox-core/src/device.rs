//! Device description handling: turning the LOCATION URL from discovery
//! into the control and event URLs of a named service.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("fetching device description: {0}")]
    Http(#[from] reqwest::Error),
    #[error("parsing device description: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("device description URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("device offers no {0} service")]
    ServiceMissing(String),
}

/// Resolved URLs for one service on one device.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub service_type: String,
    pub control_url: Url,
    pub event_url: Url,
}

/// Fetch the description document behind a discovery locator and resolve
/// the entry for `service_type`.
pub async fn resolve_service(
    http: &reqwest::Client,
    location: &str,
    service_type: &str,
) -> Result<ServiceEndpoints, DeviceError> {
    let base = Url::parse(location)?;
    let body = http
        .get(location)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    find_service(&body, &base, service_type)
}

/// Locate `service_type` in a description document. Relative control and
/// event URLs are resolved against the description's own URL.
pub fn find_service(
    description: &str,
    base: &Url,
    service_type: &str,
) -> Result<ServiceEndpoints, DeviceError> {
    #[derive(Default)]
    struct Draft {
        service_type: String,
        control_url: String,
        event_url: String,
    }

    let mut reader = Reader::from_str(description);
    reader.trim_text(true);

    let mut in_service = false;
    let mut field: Option<&'static str> = None;
    let mut draft = Draft::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"service" => {
                    in_service = true;
                    draft = Draft::default();
                }
                b"serviceType" if in_service => field = Some("type"),
                b"controlURL" if in_service => field = Some("control"),
                b"eventSubURL" if in_service => field = Some("event"),
                _ => field = None,
            },
            Event::Text(e) => {
                if let Some(which) = field {
                    let text = e.unescape()?.into_owned();
                    match which {
                        "type" => draft.service_type = text,
                        "control" => draft.control_url = text,
                        "event" => draft.event_url = text,
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                field = None;
                if e.local_name().as_ref() == b"service" {
                    in_service = false;
                    if draft.service_type == service_type {
                        return Ok(ServiceEndpoints {
                            service_type: draft.service_type,
                            control_url: base.join(&draft.control_url)?,
                            event_url: base.join(&draft.event_url)?,
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(DeviceError::ServiceMissing(service_type.to_string()))
}
