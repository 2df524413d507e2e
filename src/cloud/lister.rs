use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

/// Paginated enumeration of the source objects under a prefix.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectLister: Send + Sync {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;
}

/// Follow continuation tokens until the listing is exhausted.
///
/// Keys are returned in listing order, which is also the order entries are
/// written to the archive.
pub async fn list_all_keys<L: ObjectLister + ?Sized>(
    lister: &L,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut token = None;
    let mut pages = 0usize;

    loop {
        let page = lister
            .list(bucket, prefix, token.take())
            .await
            .context(format!("Failed to list s3://{}/{}", bucket, prefix))?;
        pages += 1;
        debug!("Listing page {} returned {} keys", pages, page.keys.len());
        keys.extend(page.keys);

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Ok(keys)
}
