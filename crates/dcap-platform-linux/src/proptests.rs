//! Property-based tests for dcap-platform-linux

use proptest::prelude::*;

use dcap_core::buffers::BufferPool;

use crate::stream::FrameSink;
use crate::tuple::{try_parse_tuple2, PortalValue};

proptest! {
    /// Every integer encoding of a pair parses to the same values.
    #[test]
    fn pair_encodings_agree(a in -10_000i32..10_000, b in -10_000i32..10_000) {
        let expected = Some((a, b));
        prop_assert_eq!(try_parse_tuple2(&PortalValue::TupleI32(a, b)), expected);
        prop_assert_eq!(try_parse_tuple2(&PortalValue::TupleI64(a as i64, b as i64)), expected);
        prop_assert_eq!(
            try_parse_tuple2(&PortalValue::Array(vec![PortalValue::I64(a as i64), PortalValue::I32(b)])),
            expected
        );
    }

    /// Published stride always covers a full row.
    #[test]
    fn stride_never_below_row_width(w in 1i32..64, h in 1i32..64, len in 0usize..65_536) {
        let sink = FrameSink::new(1, w, h, BufferPool::new(1)).unwrap();
        sink.ingest(&vec![0u8; len], Some(w), Some(h));
        let frame = sink.latest().unwrap();
        prop_assert!(frame.stride() >= w * 4);
        prop_assert_eq!(frame.len(), len);
    }
}
