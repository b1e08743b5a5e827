//! Payloads are little endian, no padding.

pub const F32_SIZE: usize = 4;
pub const ORIENTATION_MSG_SIZE: usize = 12; // 3 * f32
pub const KILL_SWITCH_MSG_SIZE: usize = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrientationMsg {
    pub roll: f32, // degrees
    pub pitch: f32,
    pub yaw: f32,
}

impl OrientationMsg {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ORIENTATION_MSG_SIZE {
            return None;
        }
        Some(OrientationMsg {
            roll: read_f32(&data[0..4])?,
            pitch: read_f32(&data[4..8])?,
            yaw: read_f32(&data[8..12])?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ORIENTATION_MSG_SIZE);
        bytes.extend_from_slice(&self.roll.to_le_bytes());
        bytes.extend_from_slice(&self.pitch.to_le_bytes());
        bytes.extend_from_slice(&self.yaw.to_le_bytes());
        bytes
    }
}

/// Depth readings, setpoint requests and error replies all carry one f32.
pub fn read_f32(data: &[u8]) -> Option<f32> {
    let bytes: [u8; F32_SIZE] = data.get(..F32_SIZE)?.try_into().ok()?;
    Some(f32::from_le_bytes(bytes))
}

pub fn f32_payload(value: f32) -> [u8; F32_SIZE] {
    value.to_le_bytes()
}

/// 1 = enabled (safe to operate), 0 = killed.
pub fn read_kill_switch(data: &[u8]) -> Option<bool> {
    data.first().map(|&b| b != 0)
}

pub fn kill_switch_payload(enabled: bool) -> [u8; KILL_SWITCH_MSG_SIZE] {
    [enabled as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_layout() {
        let msg = OrientationMsg { roll: 1.0, pitch: -2.0, yaw: 270.5 };
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), ORIENTATION_MSG_SIZE);
        assert_eq!(&bytes[8..12], &270.5f32.to_le_bytes());
        assert_eq!(OrientationMsg::from_bytes(&bytes), Some(msg));
    }

    #[test]
    fn test_short_payloads_rejected() {
        assert!(OrientationMsg::from_bytes(&[0u8; 11]).is_none());
        assert!(read_f32(&[0u8; 3]).is_none());
        assert!(read_kill_switch(&[]).is_none());
    }

    #[test]
    fn test_kill_switch_byte() {
        assert_eq!(read_kill_switch(&kill_switch_payload(true)), Some(true));
        assert_eq!(read_kill_switch(&[0]), Some(false));
        assert_eq!(read_kill_switch(&[7]), Some(true));
    }
}
