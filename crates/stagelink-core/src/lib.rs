pub mod bus;
pub mod clock;
pub mod errors;
pub mod events;
pub mod ids;
pub mod memory;
pub mod messages;
pub mod scene;

pub use bus::MessageBus;
pub use clock::FrameClock;
pub use errors::{MessageError, SceneError};
pub use events::SceneEvent;
pub use ids::{AssetId, ObjectPath};
pub use memory::{MemoryScene, StageDocument};
pub use messages::{InboundMessage, OutboundMessage};
pub use scene::{CredentialSink, EditTarget, PrimKind, Rgba, SceneHost, SelectionGroupId};
