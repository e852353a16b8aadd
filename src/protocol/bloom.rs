//! Probabilistic filter over header keys.
//!
//! Populated once per parsed head; lets [`HttpRequest::header`] skip the
//! linear header scan when a key cannot possibly be present. False
//! positives are tolerated, false negatives never occur.
//!
//! [`HttpRequest::header`]: crate::protocol::HttpRequest::header

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BloomFilter {
    bits: u64,
}

impl BloomFilter {
    #[allow(unused)]
    pub(crate) fn reset(&mut self) {
        self.bits = 0;
    }

    pub(crate) fn add(&mut self, key: &[u8]) {
        self.bits |= Self::mask(key);
    }

    pub(crate) fn might_have(&self, key: &[u8]) -> bool {
        let mask = Self::mask(key);
        self.bits & mask == mask
    }

    // three probe bits drawn from one FNV-1a pass over the key
    fn mask(key: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for &byte in key {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (1 << (hash & 63)) | (1 << ((hash >> 6) & 63)) | (1 << ((hash >> 12) & 63))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_keys_are_found() {
        let mut filter = BloomFilter::default();
        let keys: [&[u8]; 4] = [b"host", b"content-length", b"accept", b"x-custom-header"];
        for key in keys {
            filter.add(key);
        }
        for key in keys {
            assert!(filter.might_have(key));
        }
    }

    #[test]
    fn reset_clears_all_bits() {
        let mut filter = BloomFilter::default();
        filter.add(b"host");
        assert!(filter.might_have(b"host"));
        filter.reset();
        assert!(!filter.might_have(b"host"));
    }

    #[test]
    fn rejects_most_absent_keys() {
        let mut filter = BloomFilter::default();
        filter.add(b"host");
        let absent: [&[u8]; 5] =
            [b"content-type", b"user-agent", b"cookie", b"authorization", b"if-none-match"];
        // false positives are allowed, but not for every probe
        assert!(absent.iter().any(|key| !filter.might_have(key)));
    }
}
