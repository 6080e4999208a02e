bitflags::bitflags! {
    /// 16-bit key mask carried by Input packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Keys: u16 {
        const FORWARD = 1 << 0;
        const ROLL_LEFT = 1 << 1;
        const ROLL_RIGHT = 1 << 2;
        const PITCH_UP = 1 << 3;
        const PITCH_DOWN = 1 << 4;
        const YAW_LEFT = 1 << 5;
        const YAW_RIGHT = 1 << 6;
        const FIRE = 1 << 7;      // press edge only
        const BOOST = 1 << 8;
    }
}

impl Keys {
    /// Unknown bits from the wire are dropped.
    pub fn from_wire(mask: u16) -> Self {
        Self::from_bits_truncate(mask)
    }
}

/// Key mask plus the client time it was sampled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyMap {
    pub keys: Keys,
    pub time_ms: u64,
}

impl KeyMap {
    pub fn new(keys: Keys, time_ms: u64) -> Self {
        Self { keys, time_ms }
    }

    /// Client-side sampling. Returns true if the mask differs from the previous sample.
    pub fn set(&mut self, keys: Keys, time_ms: u64) -> bool {
        let changed = keys != self.keys;
        self.keys = keys;
        self.time_ms = time_ms;
        changed
    }

    /// Server-side merge. A fire press that has not been consumed survives the update.
    pub fn merge(&mut self, incoming: KeyMap) {
        let pending_fire = self.keys & Keys::FIRE;
        self.keys = incoming.keys | pending_fire;
        self.time_ms = incoming.time_ms;
    }

    /// Consumes the fire bit; true at most once per press.
    pub fn take_fire(&mut self) -> bool {
        let fire = self.keys.contains(Keys::FIRE);
        self.keys.remove(Keys::FIRE);
        fire
    }

    pub fn contains(&self, keys: Keys) -> bool {
        self.keys.contains(keys)
    }
}
