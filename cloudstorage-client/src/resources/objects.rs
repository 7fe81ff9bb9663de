use bytes::Bytes;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;

use crate::transport::Transport;
use crate::types::{Object, ObjectList};

/// Options for [`Objects::list`].
#[derive(Clone, Debug, Default)]
pub struct ListObjects {
    /// Only list objects whose names begin with this prefix.
    pub prefix: Option<String>,
    /// Collapse names containing the delimiter after the prefix into
    /// [`ObjectList::prefixes`].
    pub delimiter: Option<String>,
    /// Maximum number of items per page.
    pub max_results: Option<u32>,
    /// Continue from a previous [`ObjectList::next_page_token`].
    pub page_token: Option<String>,
}

/// The `objects` resource.
#[derive(Debug)]
pub struct Objects<'a> {
    pub(crate) transport: &'a Transport,
}

impl Objects<'_> {
    /// Retrieves the metadata of an object.
    pub async fn get(&self, bucket: &str, name: &str) -> crate::Result<Object> {
        let url = self.transport.url(&["storage", "v1", "b", bucket, "o", name])?;
        let request = self.transport.request(Method::GET, url).await?;
        Ok(self.transport.send(request).await?.json().await?)
    }

    /// Downloads the content of an object.
    pub async fn get_media(&self, bucket: &str, name: &str) -> crate::Result<Bytes> {
        let url = self.transport.url(&["storage", "v1", "b", bucket, "o", name])?;
        let request = self
            .transport
            .request(Method::GET, url)
            .await?
            .query(&[("alt", "media")]);
        Ok(self.transport.send(request).await?.bytes().await?)
    }

    /// Uploads `content` as a single media upload, creating or replacing the object.
    pub async fn insert(
        &self,
        bucket: &str,
        name: &str,
        content: Bytes,
        content_type: &str,
    ) -> crate::Result<Object> {
        let url = self.transport.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        let request = self
            .transport
            .request(Method::POST, url)
            .await?
            .query(&[("uploadType", "media"), ("name", name)])
            .header(CONTENT_TYPE, content_type)
            .body(content);
        Ok(self.transport.send(request).await?.json().await?)
    }

    /// Deletes an object.
    pub async fn delete(&self, bucket: &str, name: &str) -> crate::Result<()> {
        let url = self.transport.url(&["storage", "v1", "b", bucket, "o", name])?;
        let request = self.transport.request(Method::DELETE, url).await?;
        self.transport.send(request).await?;
        Ok(())
    }

    /// Lists one page of objects in a bucket.
    pub async fn list(&self, bucket: &str, options: &ListObjects) -> crate::Result<ObjectList> {
        let url = self.transport.url(&["storage", "v1", "b", bucket, "o"])?;
        let mut request = self.transport.request(Method::GET, url).await?;

        if let Some(prefix) = &options.prefix {
            request = request.query(&[("prefix", prefix)]);
        }
        if let Some(delimiter) = &options.delimiter {
            request = request.query(&[("delimiter", delimiter)]);
        }
        if let Some(max_results) = options.max_results {
            request = request.query(&[("maxResults", max_results)]);
        }
        if let Some(page_token) = &options.page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        Ok(self.transport.send(request).await?.json().await?)
    }
}
