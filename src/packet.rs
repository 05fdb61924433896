//! The packet module, containing the MAC frame model and the Block-ACK codec.
//! packet 模块，包含MAC帧模型和块确认编解码。

pub mod address;
pub mod block_ack;
pub mod frame;
pub mod sequence;

pub use address::MacAddress;
pub use block_ack::BlockAckInfo;
pub use frame::{
    AggregateTag, BlockAckFrame, BlockAckRequestFrame, ControlFrame, DataFrame, Frame,
    FrameClass, MpduDelimiter,
};
pub use sequence::SequenceNumber;
