//! Shared engineering substrate for the four codec engines.
//!
//! Every `#[napi]`-facing engine (`VideoEncoder`, `VideoDecoder`, `AudioEncoder`,
//! `AudioDecoder`) is built from the same four pieces assembled here: a strict-FIFO
//! [`control_queue::ControlMessageQueue`], the shared-payload [`resource`] and
//! [`chunk`] handle patterns, a [`dequeue::DequeueCoalescer`], and the process-wide
//! [`resource_manager::ResourceManager`].

pub mod backend;
pub mod chunk;
pub mod control_queue;
pub mod dequeue;
pub mod resource;
pub mod resource_manager;

pub use backend::CodecBackend;
pub use chunk::ChunkHandle;
pub use control_queue::ControlMessageQueue;
pub use dequeue::DequeueCoalescer;
pub use resource::MediaHandle;
pub use resource_manager::{Reclaimable, ResourceManager};
