use crate::channel::{Channel, ChannelId};

/// The connection's single room-list channel, bound to one conference
/// service.
#[derive(Debug)]
pub struct RoomListSession {
    server: String,
    closed: bool,
}

impl RoomListSession {
    pub fn new(server: &str) -> Self {
        Self {
            server: server.to_string(),
            closed: false,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

impl Channel for RoomListSession {
    fn id(&self) -> ChannelId {
        ChannelId::room_list()
    }

    fn is_ready(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
