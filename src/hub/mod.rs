// Real-time broadcast hub
// Tracks connected clients and fans chat messages out to all of them

pub mod broadcast;
pub mod message;
pub mod registry;

pub use broadcast::{BroadcastHub, HubConfig, PublishReport, RecentMessage};
pub use message::{ClientFrame, Message, OutboundFrame};
pub use registry::{
    ChannelSink, Client, ClientId, ClientInfo, ClientRegistry, ClientSink, DeliveryError,
    HubError,
};
