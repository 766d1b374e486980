/// Number of probe bits a trigger word covers.
pub const TRIGGER_BITS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitState {
    High,
    Low,
    Rising,
    Falling,
    DontCare,
}

#[derive(Debug)]
pub struct BitTriggerBuilder {
    bit_states: [BitState; TRIGGER_BITS],
}

impl BitTriggerBuilder {
    pub fn new() -> Self {
        Self {
            bit_states: [BitState::DontCare; TRIGGER_BITS],
        }
    }

    /// Set the state of one bit. Indices past the last probe are ignored.
    pub fn set_bit(mut self, bit: usize, state: BitState) -> Self {
        if let Some(slot) = self.bit_states.get_mut(bit) {
            *slot = state;
        } else {
            log::warn!("Ignoring trigger bit {bit}, only {TRIGGER_BITS} bits exist");
        }
        self
    }

    pub fn bit0(self, state: BitState) -> Self {
        self.set_bit(0, state)
    }

    pub fn bit1(self, state: BitState) -> Self {
        self.set_bit(1, state)
    }

    pub fn bit2(self, state: BitState) -> Self {
        self.set_bit(2, state)
    }

    pub fn bit3(self, state: BitState) -> Self {
        self.set_bit(3, state)
    }

    pub fn build(self) -> LogicTrigger {
        LogicTrigger::from_bit_states(&self.bit_states)
    }
}

impl Default for BitTriggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger words in the driver's representation.
///
/// A set `mask` bit is a don't-care, `value` holds the wanted level and
/// `edge` marks bits that must have just transitioned into that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogicTrigger {
    pub mask: u16,
    pub value: u16,
    pub edge: u16,
}

impl LogicTrigger {
    pub fn start_capturing_when() -> BitTriggerBuilder {
        BitTriggerBuilder::new()
    }

    pub fn from_bit_states(bit_states: &[BitState; TRIGGER_BITS]) -> Self {
        let mut trigger = Self::default();
        for (i, state) in bit_states.iter().enumerate() {
            let bit = 1u16 << i;
            match state {
                BitState::DontCare => trigger.mask |= bit,
                BitState::High => trigger.value |= bit,
                BitState::Low => {}
                BitState::Rising => {
                    trigger.value |= bit;
                    trigger.edge |= bit;
                }
                BitState::Falling => trigger.edge |= bit,
            }
        }
        trigger
    }

    fn level_matches(&self, sample: u16) -> bool {
        (sample | self.mask) == (self.value | self.mask)
    }

    fn edge_matches(&self, previous: u16, sample: u16) -> bool {
        (previous & self.edge) == (!self.value & self.edge)
            && self.level_matches(sample)
            && (sample & self.edge) == (self.value & self.edge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStage {
    Armed,
    Satisfied,
}

/// Streaming matcher for one acquisition.
///
/// Once satisfied it never re-arms; every later batch passes straight through.
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    trigger: LogicTrigger,
    stage: TriggerStage,
    last_sample: Option<u16>,
}

impl TriggerMatcher {
    pub fn new(trigger: LogicTrigger, armed: bool) -> Self {
        Self {
            trigger,
            stage: if armed {
                TriggerStage::Armed
            } else {
                TriggerStage::Satisfied
            },
            last_sample: None,
        }
    }

    pub fn stage(&self) -> TriggerStage {
        self.stage
    }

    pub fn is_satisfied(&self) -> bool {
        self.stage == TriggerStage::Satisfied
    }

    /// Scan a freshly synthesized batch, returning the in-batch match index.
    ///
    /// In edge mode the sample preceding the batch is carried over from the
    /// previous call; the very first sample of an acquisition has no
    /// predecessor and cannot complete an edge.
    pub fn scan(&mut self, batch: &[u16]) -> Option<usize> {
        if self.stage == TriggerStage::Satisfied {
            return None;
        }

        let hit = if self.trigger.edge == 0 {
            batch.iter().position(|&s| self.trigger.level_matches(s))
        } else {
            let mut hit = None;
            for (i, &sample) in batch.iter().enumerate() {
                if let Some(previous) = self.last_sample {
                    if self.trigger.edge_matches(previous, sample) {
                        hit = Some(i);
                        break;
                    }
                }
                self.last_sample = Some(sample);
            }
            hit
        };

        if let Some(pos) = hit {
            log::debug!("Trigger matched at batch position {pos}");
            self.stage = TriggerStage::Satisfied;
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_words() {
        let trigger = LogicTrigger::start_capturing_when()
            .bit0(BitState::High)
            .bit1(BitState::Low)
            .bit2(BitState::Rising)
            .bit3(BitState::Falling)
            .build();
        assert_eq!(trigger.mask, 0xfff0);
        assert_eq!(trigger.value, 0b0101);
        assert_eq!(trigger.edge, 0b1100);
    }

    #[test]
    fn test_out_of_range_bit_is_ignored() {
        let trigger = BitTriggerBuilder::new().set_bit(40, BitState::High).build();
        assert_eq!(trigger.mask, 0xffff);
        assert_eq!(trigger.value, 0);
    }

    #[test]
    fn test_level_match_first_occurrence() {
        let trigger = LogicTrigger {
            mask: 0,
            value: 0x0042,
            edge: 0,
        };
        let mut matcher = TriggerMatcher::new(trigger, true);
        assert_eq!(matcher.scan(&[0, 1, 0x42, 7, 0x42]), Some(2));
        assert!(matcher.is_satisfied());
        assert_eq!(matcher.scan(&[0x42]), None);
    }

    #[test]
    fn test_level_no_match() {
        let trigger = LogicTrigger {
            mask: 0,
            value: 0x0042,
            edge: 0,
        };
        let mut matcher = TriggerMatcher::new(trigger, true);
        assert_eq!(matcher.scan(&[0, 1, 2, 3]), None);
        assert_eq!(matcher.stage(), TriggerStage::Armed);
    }

    #[test]
    fn test_mask_bits_are_dont_care() {
        let trigger = LogicTrigger {
            mask: 0xff00,
            value: 0x0001,
            edge: 0,
        };
        let mut matcher = TriggerMatcher::new(trigger, true);
        assert_eq!(matcher.scan(&[0x1200, 0x3401]), Some(1));
    }

    #[test]
    fn test_steady_level_without_edge_does_not_match() {
        let trigger = LogicTrigger::start_capturing_when()
            .bit0(BitState::Rising)
            .build();
        let mut matcher = TriggerMatcher::new(trigger, true);
        assert_eq!(matcher.scan(&[1, 1, 1, 1]), None);
        assert_eq!(matcher.scan(&[1, 1]), None);
        assert_eq!(matcher.scan(&[1, 0, 0, 1, 1]), Some(3));
    }

    #[test]
    fn test_edge_carries_across_batches() {
        let trigger = LogicTrigger::start_capturing_when()
            .bit0(BitState::Falling)
            .build();
        let mut matcher = TriggerMatcher::new(trigger, true);
        assert_eq!(matcher.scan(&[0, 1]), None);
        assert_eq!(matcher.scan(&[0, 0]), Some(0));
    }

    #[test]
    fn test_first_sample_has_no_predecessor() {
        let trigger = LogicTrigger::start_capturing_when()
            .set_bit(7, BitState::Rising)
            .build();
        let mut matcher = TriggerMatcher::new(trigger, true);
        assert_eq!(matcher.scan(&[0x8080]), None);
        assert_eq!(matcher.stage(), TriggerStage::Armed);
        assert_eq!(matcher.scan(&[0x0000, 0x8080]), Some(1));
    }

    #[test]
    fn test_disarmed_matcher_passes_through() {
        let mut matcher = TriggerMatcher::new(LogicTrigger::default(), false);
        assert!(matcher.is_satisfied());
        assert_eq!(matcher.scan(&[0, 0, 0]), None);
    }
}
