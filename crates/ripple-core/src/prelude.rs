//! 常用契约的一站式导入。

pub use crate::channel::{CancelPolicy, REQUEST_UNBOUNDED, Subscriber, Subscription};
pub use crate::codec::{Codec, DecodeOutcome};
pub use crate::error::{CoreError, codes};
pub use crate::frame::Frame;
pub use crate::peer::{PeerState, PeerStateCell, ShutdownOutcome};
