//! Property-based checks for the lowest-level primitives, run against
//! arbitrary inputs rather than hand-picked examples.

use proptest::prelude::*;
use streamdb::serial::SerialId;
use streamdb::varint::{BitReader, BitWriter};
use streamdb::version::VersionCounter;

proptest! {
    #[test]
    fn varint_round_trips_over_full_domain(value in 0u32..=(1u32 << 22) + 16_510) {
        let mut writer = BitWriter::new();
        writer.write_uint(value);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        prop_assert_eq!(reader.read_uint(), Some(value));
    }

    #[test]
    fn version_counter_next_is_always_newer(start in 0u8..=255) {
        let a = VersionCounter::new(start);
        let b = a.next();
        prop_assert!(b.compare(a) > 0);
    }

    #[test]
    fn version_counter_freeze_defrost_round_trips(start in 0u8..=255) {
        let counter = VersionCounter::new(start);
        prop_assert_eq!(VersionCounter::new(counter.0), counter);
    }

    #[test]
    fn serial_id_freeze_defrost_round_trips(bytes in proptest::array::uniform16(any::<u8>())) {
        let id = SerialId::from_bytes(bytes);
        prop_assert_eq!(SerialId::from_bytes(*id.as_bytes()), id);
    }
}
