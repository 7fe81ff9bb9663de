use reqwest::Method;

use crate::transport::Transport;
use crate::types::{Bucket, BucketList};

/// The `buckets` resource.
#[derive(Debug)]
pub struct Buckets<'a> {
    pub(crate) transport: &'a Transport,
}

impl Buckets<'_> {
    /// Lists one page of buckets of a project.
    pub async fn list(&self, project: &str, page_token: Option<&str>) -> crate::Result<BucketList> {
        let url = self.transport.url(&["storage", "v1", "b"])?;
        let mut request = self
            .transport
            .request(Method::GET, url)
            .await?
            .query(&[("project", project)]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        Ok(self.transport.send(request).await?.json().await?)
    }

    /// Retrieves the metadata of a bucket.
    pub async fn get(&self, bucket: &str) -> crate::Result<Bucket> {
        let url = self.transport.url(&["storage", "v1", "b", bucket])?;
        let request = self.transport.request(Method::GET, url).await?;
        Ok(self.transport.send(request).await?.json().await?)
    }

    /// Creates a bucket in a project.
    pub async fn insert(&self, project: &str, name: &str) -> crate::Result<Bucket> {
        let url = self.transport.url(&["storage", "v1", "b"])?;
        let request = self
            .transport
            .request(Method::POST, url)
            .await?
            .query(&[("project", project)])
            .json(&serde_json::json!({ "name": name }));

        Ok(self.transport.send(request).await?.json().await?)
    }

    /// Deletes an empty bucket.
    pub async fn delete(&self, bucket: &str) -> crate::Result<()> {
        let url = self.transport.url(&["storage", "v1", "b", bucket])?;
        let request = self.transport.request(Method::DELETE, url).await?;
        self.transport.send(request).await?;
        Ok(())
    }
}
