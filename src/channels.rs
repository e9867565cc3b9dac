use crate::prelude::*;
use crate::deye::logger;

#[derive(Debug, Clone)]
pub struct Channels {
    pub from_logger: broadcast::Sender<logger::ChannelData>,
    pub to_logger: broadcast::Sender<logger::ChannelData>,
    pub to_mqtt: broadcast::Sender<crate::mqtt::ChannelData>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            from_logger: Self::channel(),
            to_logger: Self::channel(),
            to_mqtt: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
