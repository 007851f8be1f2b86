//! In-process channels between ingress, the listener and the error publisher

pub mod channel;

pub use channel::{
    channel, ChannelClosed, EventReceiver, EventSender, NotificationReceiver, NotificationSender,
    Receiver, Sender,
};
