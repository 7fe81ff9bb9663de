use reqwest::Method;

use crate::transport::Transport;
use crate::types::Channel;

/// The `channels` resource.
#[derive(Debug)]
pub struct Channels<'a> {
    pub(crate) transport: &'a Transport,
}

impl Channels<'_> {
    /// Stops receiving notifications on a channel.
    ///
    /// `id` and `resource_id` of the channel must be set.
    pub async fn stop(&self, channel: &Channel) -> crate::Result<()> {
        let url = self.transport.url(&["storage", "v1", "channels", "stop"])?;
        let request = self
            .transport
            .request(Method::POST, url)
            .await?
            .json(channel);
        self.transport.send(request).await?;
        Ok(())
    }
}
