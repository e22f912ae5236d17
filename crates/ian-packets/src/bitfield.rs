use crate::error::PayloadError;

/// Fixed-size set of presence flags for optional payload fields.
///
/// Bit `i` lives in byte `i / 8` at position `i % 8`, least significant
/// bit first, packed into `ceil(bit_count / 8)` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitField {
    bit_count: usize,
    bytes: Vec<u8>,
}

impl BitField {
    /// A field of `bit_count` bits, all clear.
    pub fn new(bit_count: usize) -> Self {
        Self {
            bit_count,
            bytes: vec![0; Self::byte_count_for(bit_count)],
        }
    }

    /// Build a field from its packed wire bytes.
    ///
    /// `bytes` must hold exactly [`byte_count_for`](Self::byte_count_for)
    /// bytes. Bits beyond `bit_count` in the final byte are kept as sent.
    pub fn from_bytes(bit_count: usize, bytes: &[u8]) -> Result<Self, PayloadError> {
        let needed = Self::byte_count_for(bit_count);
        if bytes.len() != needed {
            return Err(PayloadError::UnexpectedEnd {
                needed,
                remaining: bytes.len(),
            });
        }
        Ok(Self {
            bit_count,
            bytes: bytes.to_vec(),
        })
    }

    /// Bytes needed to hold `bit_count` bits.
    pub const fn byte_count_for(bit_count: usize) -> usize {
        bit_count.div_ceil(8)
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn byte_count(&self) -> usize {
        self.bytes.len()
    }

    /// Whether `bit` is set. Bits outside the field read as clear.
    pub fn get(&self, bit: usize) -> bool {
        bit < self.bit_count && self.bytes[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// Set or clear `bit`.
    pub fn set(&mut self, bit: usize, value: bool) -> Result<(), PayloadError> {
        if bit >= self.bit_count {
            return Err(PayloadError::BitOutOfRange {
                bit,
                bit_count: self.bit_count,
            });
        }
        let mask = 1 << (bit % 8);
        if value {
            self.bytes[bit / 8] |= mask;
        } else {
            self.bytes[bit / 8] &= !mask;
        }
        Ok(())
    }

    /// Indices of every set bit, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bit_count).filter(|&bit| self.get(bit))
    }

    /// Whether no bit is set.
    pub fn is_clear(&self) -> bool {
        self.iter_set().next().is_none()
    }

    /// The packed wire representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_count_rounds_up() {
        assert_eq!(BitField::byte_count_for(0), 0);
        assert_eq!(BitField::byte_count_for(1), 1);
        assert_eq!(BitField::byte_count_for(8), 1);
        assert_eq!(BitField::byte_count_for(9), 2);
        assert_eq!(BitField::byte_count_for(33), 5);
    }

    #[test]
    fn packs_least_significant_bit_first() {
        let mut bits = BitField::new(12);
        bits.set(0, true).unwrap();
        bits.set(3, true).unwrap();
        bits.set(9, true).unwrap();
        assert_eq!(bits.as_bytes(), &[0b0000_1001, 0b0000_0010]);

        bits.set(3, false).unwrap();
        assert_eq!(bits.as_bytes(), &[0b0000_0001, 0b0000_0010]);
    }

    #[test]
    fn roundtrip_through_wire_bytes() {
        for bit_count in [1usize, 7, 8, 9, 16, 23, 40] {
            let selections: [&dyn Fn(usize) -> bool; 4] = [
                &|_| false,
                &|_| true,
                &|bit| bit % 3 == 0,
                &|bit| bit + 1 == bit_count,
            ];
            for selected in selections {
                let mut bits = BitField::new(bit_count);
                let expected: Vec<usize> = (0..bit_count).filter(|&bit| selected(bit)).collect();
                for &bit in &expected {
                    bits.set(bit, true).unwrap();
                }

                let decoded = BitField::from_bytes(bit_count, bits.as_bytes()).unwrap();
                assert_eq!(decoded.iter_set().collect::<Vec<_>>(), expected);
                assert_eq!(decoded, bits);
            }
        }
    }

    #[test]
    fn out_of_range_bits() {
        let mut bits = BitField::new(4);
        assert!(!bits.get(4));
        assert!(!bits.get(100));
        assert!(matches!(
            bits.set(4, true),
            Err(PayloadError::BitOutOfRange { bit: 4, bit_count: 4 })
        ));
        assert!(bits.is_clear());
    }

    #[test]
    fn from_bytes_requires_exact_length() {
        assert!(BitField::from_bytes(9, &[0xff]).is_err());
        assert!(BitField::from_bytes(9, &[0xff, 0x01, 0x00]).is_err());
        let bits = BitField::from_bytes(9, &[0x00, 0x01]).unwrap();
        assert_eq!(bits.iter_set().collect::<Vec<_>>(), vec![8]);
    }
}
