//! DIDL-Lite catalog fragment parsing.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DidlError {
    #[error("parsing DIDL-Lite fragment: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Catalog entry metadata, keyed elsewhere by its resource URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub title: String,
    pub description: String,
}

/// One `<item>` as found in a fragment, fields optional until validated.
#[derive(Debug, Default, Clone)]
pub struct DidlItem {
    pub resource: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl DidlItem {
    /// Accept the record only when resource, title and description are all
    /// present and non-empty; anything less is skipped, not an error.
    pub fn into_entry(self) -> Option<(String, CatalogItem)> {
        match (self.resource, self.title, self.description) {
            (Some(res), Some(title), Some(description))
                if !res.is_empty() && !title.is_empty() && !description.is_empty() =>
            {
                Some((res, CatalogItem { title, description }))
            }
            _ => None,
        }
    }
}

/// Extract every `<item>` from a decoded DIDL-Lite fragment.
pub fn parse_items(fragment: &str) -> Result<Vec<DidlItem>, DidlError> {
    let mut reader = Reader::from_str(fragment);
    reader.trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<DidlItem> = None;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"item" => {
                    current = Some(DidlItem::default());
                    field = None;
                }
                b"res" if current.is_some() => field = Some("res"),
                b"title" if current.is_some() => field = Some("title"),
                b"description" if current.is_some() => field = Some("description"),
                _ => field = None,
            },
            Event::Text(e) => {
                if let (Some(item), Some(which)) = (current.as_mut(), field) {
                    let text = e.unescape()?.into_owned();
                    let slot = match which {
                        "res" => &mut item.resource,
                        "title" => &mut item.title,
                        _ => &mut item.description,
                    };
                    match slot {
                        Some(existing) => existing.push_str(&text),
                        None => *slot = Some(text),
                    }
                }
            }
            Event::End(e) => {
                field = None;
                if e.local_name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}
