use ledger_primitives::range::partition;
use proptest::prelude::*;


fn range_and_k() -> impl Strategy<Value = (u64, u64, usize)> {
    (0u64..10_000, 1u64..2_000).prop_flat_map(|(start, width)| {
        (Just(start), Just(width), 1..=width as usize)
    })
}


proptest! {
    #[test]
    fn partition_is_exact((start, width, k) in range_and_k()) {
        let range = start..start + width;
        let chunks = partition(range.clone(), k).unwrap();

        prop_assert_eq!(chunks.len(), k);

        let s = width / k as u64;
        let mut total = 0;
        for chunk in &chunks {
            prop_assert!(chunk.end > chunk.start);
            let chunk_width = chunk.end - chunk.start;
            prop_assert!(chunk_width == s || chunk_width == s + 1);
            total += chunk_width;
        }
        prop_assert_eq!(total, width);

        // contiguous cover, no gaps, no overlaps
        prop_assert_eq!(chunks[0].start, range.start);
        prop_assert_eq!(chunks[k - 1].end, range.end);
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].end, pair[1].start);
        }
    }
}
