//! Message transports between a client stub and the server skeleton.

use crate::protocol::Message;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, msg: Message) -> anyhow::Result<()>;
    async fn recv(&mut self) -> anyhow::Result<Message>;

    /// Discard any half-read state after the caller gave up on a reply.
    fn reset(&mut self) {}
}

pub mod in_memory;
pub mod tcp;
