use reqwest::Method;

use crate::transport::Transport;
use crate::types::{AccessControl, AccessControlList};

/// Which access control list of a bucket is addressed.
#[derive(Clone, Copy, Debug)]
enum AclKind {
    /// `b/{bucket}/acl`
    Bucket,
    /// `b/{bucket}/defaultObjectAcl`
    DefaultObject,
}

impl AclKind {
    fn segment(self) -> &'static str {
        match self {
            Self::Bucket => "acl",
            Self::DefaultObject => "defaultObjectAcl",
        }
    }
}

/// Operations shared by both access control resources.
#[derive(Debug)]
struct Acl<'a> {
    transport: &'a Transport,
    kind: AclKind,
}

impl Acl<'_> {
    async fn list(&self, bucket: &str) -> crate::Result<Vec<AccessControl>> {
        let url = self
            .transport
            .url(&["storage", "v1", "b", bucket, self.kind.segment()])?;
        let request = self.transport.request(Method::GET, url).await?;
        let list: AccessControlList = self.transport.send(request).await?.json().await?;
        Ok(list.items)
    }

    async fn get(&self, bucket: &str, entity: &str) -> crate::Result<AccessControl> {
        let url = self
            .transport
            .url(&["storage", "v1", "b", bucket, self.kind.segment(), entity])?;
        let request = self.transport.request(Method::GET, url).await?;
        Ok(self.transport.send(request).await?.json().await?)
    }

    async fn insert(&self, bucket: &str, entity: &str, role: &str) -> crate::Result<AccessControl> {
        let url = self
            .transport
            .url(&["storage", "v1", "b", bucket, self.kind.segment()])?;
        let request = self
            .transport
            .request(Method::POST, url)
            .await?
            .json(&serde_json::json!({ "entity": entity, "role": role }));
        Ok(self.transport.send(request).await?.json().await?)
    }

    async fn delete(&self, bucket: &str, entity: &str) -> crate::Result<()> {
        let url = self
            .transport
            .url(&["storage", "v1", "b", bucket, self.kind.segment(), entity])?;
        let request = self.transport.request(Method::DELETE, url).await?;
        self.transport.send(request).await?;
        Ok(())
    }
}

/// The `bucketAccessControls` resource.
#[derive(Debug)]
pub struct BucketAccessControls<'a>(Acl<'a>);

impl<'a> BucketAccessControls<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self(Acl {
            transport,
            kind: AclKind::Bucket,
        })
    }

    /// Lists the access control entries of a bucket.
    pub async fn list(&self, bucket: &str) -> crate::Result<Vec<AccessControl>> {
        self.0.list(bucket).await
    }

    /// Retrieves the entry for `entity`.
    pub async fn get(&self, bucket: &str, entity: &str) -> crate::Result<AccessControl> {
        self.0.get(bucket, entity).await
    }

    /// Grants `role` (`READER`, `WRITER` or `OWNER`) to `entity`.
    pub async fn insert(&self, bucket: &str, entity: &str, role: &str) -> crate::Result<AccessControl> {
        self.0.insert(bucket, entity, role).await
    }

    /// Removes the entry for `entity`.
    pub async fn delete(&self, bucket: &str, entity: &str) -> crate::Result<()> {
        self.0.delete(bucket, entity).await
    }
}

/// The `defaultObjectAccessControls` resource, applied to objects created without explicit ACLs.
#[derive(Debug)]
pub struct DefaultObjectAccessControls<'a>(Acl<'a>);

impl<'a> DefaultObjectAccessControls<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self(Acl {
            transport,
            kind: AclKind::DefaultObject,
        })
    }

    /// Lists the default object access control entries of a bucket.
    pub async fn list(&self, bucket: &str) -> crate::Result<Vec<AccessControl>> {
        self.0.list(bucket).await
    }

    /// Retrieves the entry for `entity`.
    pub async fn get(&self, bucket: &str, entity: &str) -> crate::Result<AccessControl> {
        self.0.get(bucket, entity).await
    }

    /// Grants `role` (`READER` or `OWNER`) to `entity` on new objects.
    pub async fn insert(&self, bucket: &str, entity: &str, role: &str) -> crate::Result<AccessControl> {
        self.0.insert(bucket, entity, role).await
    }

    /// Removes the entry for `entity`.
    pub async fn delete(&self, bucket: &str, entity: &str) -> crate::Result<()> {
        self.0.delete(bucket, entity).await
    }
}
