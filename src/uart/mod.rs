pub mod protocol;
pub use protocol::*;

pub const SYNC_BYTE: u8 = 0xAA;
pub const MAX_MSG_SIZE: usize = 244;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Depth = 0x02,
    Heartbeat = 0x04,
    Orientation = 0x05,
    KillSwitch = 0x06,
    SetDepth = 0x20,
    SetHeading = 0x21,
    SetSpeed = 0x22,
    DepthReply = 0x30,
    HeadingReply = 0x31,
}

impl MsgType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x02 => Some(MsgType::Depth),
            0x04 => Some(MsgType::Heartbeat),
            0x05 => Some(MsgType::Orientation),
            0x06 => Some(MsgType::KillSwitch),
            0x20 => Some(MsgType::SetDepth),
            0x21 => Some(MsgType::SetHeading),
            0x22 => Some(MsgType::SetSpeed),
            0x30 => Some(MsgType::DepthReply),
            0x31 => Some(MsgType::HeadingReply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UartFrame {
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

pub fn calculate_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

// frame format: [SYNC][TYPE][LEN][PAYLOAD...][CHECKSUM]
//              0xAA  1byte 1byte  LEN bytes   1byte
pub fn encode_frame(msg_type: MsgType, payload: &[u8]) -> Option<Vec<u8>> {
    if payload.len() > MAX_MSG_SIZE {
        return None;
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(SYNC_BYTE);
    frame.push(msg_type as u8);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);

    let checksum = calculate_checksum(&frame[1..]);
    frame.push(checksum);
    Some(frame)
}

/// Incremental decoder over a byte stream with resync on garbage.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    rx_buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder { rx_buffer: Vec::with_capacity(512) }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.rx_buffer.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.rx_buffer.len()
    }

    /// Next complete frame, skipping corrupt or unknown ones.
    pub fn next_frame(&mut self) -> Option<UartFrame> {
        loop {
            if self.rx_buffer.len() < 4 {
                return None;
            }

            // find sync byte
            let sync_pos = match self.rx_buffer.iter().position(|&b| b == SYNC_BYTE) {
                Some(pos) => pos,
                None => {
                    self.rx_buffer.clear();
                    return None;
                }
            };
            if sync_pos > 0 {
                self.rx_buffer.drain(0..sync_pos);
            }

            if self.rx_buffer.len() < 4 {
                return None;
            }

            let msg_type_byte = self.rx_buffer[1];
            let len = self.rx_buffer[2] as usize;

            if len > MAX_MSG_SIZE {
                self.rx_buffer.remove(0);
                continue;
            }

            let frame_len = 4 + len; // sync + type + len + payload + checksum
            if self.rx_buffer.len() < frame_len {
                return None;
            }

            let checksum = self.rx_buffer[3 + len];
            if checksum != calculate_checksum(&self.rx_buffer[1..3 + len]) {
                log::debug!("uart checksum mismatch, resyncing");
                self.rx_buffer.remove(0);
                continue;
            }

            let payload = self.rx_buffer[3..3 + len].to_vec();
            self.rx_buffer.drain(0..frame_len);

            match MsgType::from_u8(msg_type_byte) {
                Some(msg_type) => return Some(UartFrame { msg_type, payload }),
                None => log::debug!("dropping frame with unknown type 0x{:02x}", msg_type_byte),
            }
        }
    }
}
