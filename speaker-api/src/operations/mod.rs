//! Operations understood by a speaker's control endpoint

mod broadcast;
mod forwarding;
mod playback;

pub use broadcast::{
    ChangeServiceNameOperation, ChangeServiceNameRequest, ToggleBroadcastOperation,
    ToggleBroadcastRequest,
};
pub use forwarding::{
    ForwardToNodesOperation, ForwardToNodesRequest, RemoveForwardToNodesOperation,
    RemoveForwardToNodesRequest,
};
pub use playback::{
    GetCurrentTrackOperation, GetMutedOperation, MutedResponse, TrackResponse,
};
