//! JSON-RPC plumbing shared by the piped and streamed transports.

pub(crate) mod handshake;
pub(crate) mod protocol;
pub(crate) mod session;

pub(crate) use handshake::discover;
pub(crate) use session::{
    FrameSender, OutboundFrame, PendingCalls, RpcSession, channel_ended, dispatch_frame,
};
