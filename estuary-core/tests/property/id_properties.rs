//! Property tests for commit-id encoding.

use estuary_core::CommitId;
use proptest::prelude::*;

proptest! {
    #[test]
    fn hex_round_trips(bytes in prop::array::uniform32(any::<u8>())) {
        let id = CommitId::from_bytes(bytes);
        let parsed = CommitId::from_hex(&id.to_hex()).unwrap();
        prop_assert_eq!(parsed, id);
    }

    #[test]
    fn ordering_matches_bytes(a in prop::array::uniform32(any::<u8>()),
                              b in prop::array::uniform32(any::<u8>())) {
        let (ida, idb) = (CommitId::from_bytes(a), CommitId::from_bytes(b));
        prop_assert_eq!(ida.cmp(&idb), a.cmp(&b));
    }
}
