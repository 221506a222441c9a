//! Per-request handler context.

use agenshield_core::protocol::Channel;

/// Who is asking, and over which transport. Socket connections carry the
/// peer's credentials where the OS exposes them; HTTP carries none.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub channel: Channel,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub pid: Option<i32>,
}

impl HandlerContext {
    pub fn socket(uid: Option<u32>, gid: Option<u32>, pid: Option<i32>) -> Self {
        Self {
            channel: Channel::Socket,
            uid,
            gid,
            pid,
        }
    }

    pub fn http() -> Self {
        Self {
            channel: Channel::Http,
            uid: None,
            gid: None,
            pid: None,
        }
    }
}
