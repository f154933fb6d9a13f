//! Paginated retrieval of the recording catalog via the Browse action.

use crate::didl::{self, CatalogItem};
use crate::soap::{SoapClient, SoapError};
use crate::xmltext;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Resource URI -> item metadata, deduplicated by construction.
pub type Catalog = BTreeMap<String, CatalogItem>;

/// One Browse response: the escaped DIDL-Lite fragment plus the server's
/// idea of how many items exist in total.
#[derive(Debug, Clone)]
pub struct BrowsePage {
    pub result: String,
    pub total_matches: u32,
}

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("browse call failed: {0}")]
    Rpc(#[from] SoapError),
    #[error("parsing catalog page: {0}")]
    Didl(#[from] didl::DidlError),
    /// The server kept promising more items than it ever produced. Without
    /// this abort the pagination loop would spin forever.
    #[error("enumeration stalled at {have} of {total} reported items")]
    Stalled { have: usize, total: u32 },
}

/// The remote enumeration call, abstracted so the pagination engine can be
/// exercised against a scripted server.
#[async_trait]
pub trait BrowseClient: Send + Sync {
    async fn browse(
        &self,
        object_id: &str,
        starting_index: u32,
        requested_count: u32,
    ) -> Result<BrowsePage, SoapError>;
}

/// Browse against a real SkyBrowse control endpoint.
pub struct SkyBrowse {
    soap: SoapClient,
    control_url: Url,
    service_type: String,
}

impl SkyBrowse {
    pub fn new(soap: SoapClient, control_url: Url, service_type: impl Into<String>) -> Self {
        Self {
            soap,
            control_url,
            service_type: service_type.into(),
        }
    }
}

#[async_trait]
impl BrowseClient for SkyBrowse {
    async fn browse(
        &self,
        object_id: &str,
        starting_index: u32,
        requested_count: u32,
    ) -> Result<BrowsePage, SoapError> {
        let response = self
            .soap
            .call(
                &self.control_url,
                &self.service_type,
                "Browse",
                &[
                    ("ObjectID", object_id.to_string()),
                    ("BrowseFlag", "BrowseDirectChildren".to_string()),
                    ("Filter", "*".to_string()),
                    ("StartingIndex", starting_index.to_string()),
                    ("RequestedCount", requested_count.to_string()),
                    ("SortCriteria", String::new()),
                ],
            )
            .await?;

        Ok(BrowsePage {
            result: response.field("Result")?,
            total_matches: response.uint_field("TotalMatches")?,
        })
    }
}

/// Drive Browse to completion and return the full catalog.
///
/// Pages are fetched strictly one at a time: the next starting index is the
/// count of unique items accumulated so far, which stays correct when the
/// server returns short or overlapping pages. `progress` fires once per
/// page with `(accumulated, reported_total)`. A page that adds nothing
/// while the total is still unreached aborts with
/// [`BrowseError::Stalled`]; retrying is the caller's decision.
pub async fn fetch_catalog<C, F>(
    client: &C,
    object_id: &str,
    page_size: u32,
    mut progress: F,
) -> Result<Catalog, BrowseError>
where
    C: BrowseClient + ?Sized,
    F: FnMut(usize, u32),
{
    let mut catalog = Catalog::new();

    loop {
        let offset = catalog.len() as u32;
        let page = client.browse(object_id, offset, page_size).await?;
        let fragment = xmltext::decode(&page.result);

        let before = catalog.len();
        for item in didl::parse_items(&fragment)? {
            if let Some((resource, meta)) = item.into_entry() {
                // Last write wins: a catalog shifting mid-enumeration may
                // resend an item with fresher metadata.
                catalog.insert(resource, meta);
            }
        }

        progress(catalog.len(), page.total_matches);
        tracing::debug!(
            "browse page at {}: {} of {} items",
            offset,
            catalog.len(),
            page.total_matches
        );

        if catalog.len() as u32 >= page.total_matches {
            return Ok(catalog);
        }
        if catalog.len() == before {
            return Err(BrowseError::Stalled {
                have: catalog.len(),
                total: page.total_matches,
            });
        }
    }
}
